#[tokio::main]
async fn main() {
    if let Err(e) = macagent_lib::run().await {
        eprintln!("macagent: {e}");
        std::process::exit(1);
    }
}
