pub mod graph;
pub mod planner;
pub mod producer;
pub mod task_service;
pub mod validate;

pub use graph::{NodeRef, TaskGraph};
pub use planner::TaskPlanner;
pub use producer::TaskProducer;
pub use task_service::TaskService;
pub use validate::MAX_DEPTH;
