use chrono::{DateTime, TimeZone};

use crate::clock::Clock;
use crate::core::graph::{NodeRef, TaskGraph};
use crate::core::validate;
use crate::error::{DeadlineViolation, Result, TaskError};

/// Re-plans the deadline of one existing task.
///
/// The graph must hold the task's parent (when it has one) and its full
/// descendant subtree.
pub struct TaskPlanner<'a> {
    graph: &'a mut TaskGraph,
    node: NodeRef,
    clock: &'a dyn Clock,
}

impl<'a> TaskPlanner<'a> {
    pub fn new(graph: &'a mut TaskGraph, node: NodeRef, clock: &'a dyn Clock) -> Self {
        Self { graph, node, clock }
    }

    pub fn set_deadline<Tz: TimeZone>(&mut self, new_deadline: DateTime<Tz>) -> Result<()> {
        let deadline = validate::validate_deadline_in_future(&new_deadline, self.clock.now())?;

        match self.graph.parent(self.node) {
            Some(parent) => {
                if self.graph.task(parent).deadline() < deadline {
                    return Err(TaskError::InvalidDeadline(DeadlineViolation::ExceedsParent));
                }
            }
            None => {
                if let Some(missing) = self.graph.task(self.node).parent_id() {
                    return Err(TaskError::MissingAncestor(missing.clone()));
                }
            }
        }

        let below = self
            .graph
            .descendants(self.node)
            .into_iter()
            .any(|d| self.graph.task(d).deadline() > deadline);
        if below {
            return Err(TaskError::InvalidDeadline(
                DeadlineViolation::BelowDescendant,
            ));
        }

        self.graph.task_mut(self.node).set_deadline(deadline);
        tracing::debug!(task = ?self.graph.task(self.node).id(), %deadline, "deadline re-planned");
        Ok(())
    }
}
