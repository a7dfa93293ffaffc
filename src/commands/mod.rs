pub mod task;

pub use task::{TaskCommand, TaskResult};
