pub mod helper;
pub mod task_supervisor;
pub mod timeout;

pub use timeout::with_timeout;
