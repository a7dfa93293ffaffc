use crate::clock::Clock;
use crate::core::graph::{NodeRef, TaskGraph};
use crate::core::validate::{self, MAX_DEPTH};
use crate::error::{DeadlineViolation, Result, TaskError};
use crate::types::{NewTask, Task};

/// Builds new tasks, enforcing the rules for where a task may be attached.
pub struct TaskProducer<'a> {
    clock: &'a dyn Clock,
}

impl<'a> TaskProducer<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// Validate `new_task` and insert it into `graph` under `parent`.
    ///
    /// The parent must be loaded with its full ancestor chain so its depth
    /// can be computed. Nothing is inserted unless every check passes.
    pub fn create_task(
        &self,
        graph: &mut TaskGraph,
        new_task: NewTask,
        parent: Option<NodeRef>,
    ) -> Result<NodeRef> {
        let now = self.clock.now();
        let deadline = validate::validate_deadline_in_future(&new_task.deadline, now)?;

        if let Some(parent) = parent {
            if graph.depth(parent)? >= MAX_DEPTH {
                return Err(TaskError::MaxDepth { max: MAX_DEPTH });
            }
            let parent_task = graph.task(parent);
            if parent_task.is_done() {
                return Err(TaskError::ParentFinished);
            }
            if deadline > parent_task.deadline() {
                return Err(TaskError::InvalidDeadline(DeadlineViolation::ExceedsParent));
            }
        }

        validate::validate_title(&new_task.title)?;
        validate::validate_description(&new_task.description)?;

        let task = Task::new(
            new_task.title,
            new_task.description,
            deadline,
            new_task.user_id,
            now,
        );
        Ok(graph.insert(task, parent))
    }
}
