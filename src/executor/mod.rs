pub mod input;
pub mod logger;
pub mod toolbox;

pub use input::{EnigoDriver, InputDriver};
pub use toolbox::{ActionExecutor, ActionRecord};
