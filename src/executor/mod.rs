pub mod dispatcher;
pub mod input;
pub mod safety;
pub mod text_input;

pub use dispatcher::ActionExecutor;
pub use input::{EnigoDevice, InputDevice};
