pub mod locks;
pub mod machine;
pub mod retry;
pub mod route;
pub mod state;

pub use machine::Lifecycle;
