use rusqlite::Connection;
use tracing::info;

use crate::clock::Clock;
use crate::core::graph::{NodeRef, TaskGraph};
use crate::core::planner::TaskPlanner;
use crate::core::producer::TaskProducer;
use crate::core::validate;
use crate::db::task_repo;
use crate::error::{Result, TaskError};
use crate::id::{TaskId, UserId};
use crate::types::{
    CreateTaskInput, NewTask, RootFilter, Task, TaskField, TaskTree, TaskView, UpdateTaskInput,
};

/// Task use cases for one acting user.
///
/// Every mutating call runs inside a single transaction: the tree is loaded,
/// the domain operation runs, and the result is saved and committed only if
/// every check passed.
pub struct TaskService<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
    user: UserId,
}

impl<'a> TaskService<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock, user: UserId) -> Self {
        Self { conn, clock, user }
    }

    pub fn create(&self, input: &CreateTaskInput) -> Result<TaskView> {
        let tx = self.conn.unchecked_transaction()?;

        let (mut graph, parent) = match &input.parent_id {
            Some(parent_id) => {
                let (graph, node) = task_repo::get_with_ancestors(&tx, parent_id)?
                    .ok_or_else(|| TaskError::ParentNotFound(parent_id.clone()))?;
                self.guard_owner(parent_id, graph.task(node))?;
                (graph, Some(node))
            }
            None => (TaskGraph::new(), None),
        };

        let new_task = NewTask {
            title: input.title.clone(),
            description: input.description.clone(),
            deadline: input.deadline,
            user_id: self.user,
        };
        let node = TaskProducer::new(self.clock).create_task(&mut graph, new_task, parent)?;

        task_repo::save(&tx, &mut graph)?;
        tx.commit()?;

        let view = graph.view(node);
        info!(task = ?view.id, user = %self.user, depth = ?view.depth, "task created");
        Ok(view)
    }

    pub fn get(&self, id: &TaskId) -> Result<TaskView> {
        let (graph, node) = self.owned(id, task_repo::get_with_ancestors(self.conn, id)?)?;
        Ok(graph.view(node))
    }

    pub fn tree(&self, id: &TaskId) -> Result<TaskTree> {
        let (graph, node) = self.owned(id, task_repo::get_with_lineage(self.conn, id)?)?;
        Ok(graph.to_tree(node))
    }

    /// The user's root tasks with their subtrees
    pub fn list_roots(&self, filter: RootFilter) -> Result<Vec<TaskTree>> {
        let roots = task_repo::list_roots(self.conn, self.user, filter.completed())?;
        let mut trees = Vec::with_capacity(roots.len());
        for root in roots {
            let Some(id) = root.id() else { continue };
            if let Some((graph, node)) = task_repo::get_with_descendants(self.conn, id)? {
                trees.push(graph.to_tree(node));
            }
        }
        Ok(trees)
    }

    /// Change title, description and/or deadline. All checks run before the
    /// task is touched.
    pub fn update(&self, id: &TaskId, input: &UpdateTaskInput) -> Result<TaskView> {
        let tx = self.conn.unchecked_transaction()?;
        let (mut graph, node) = self.owned(id, task_repo::get_with_lineage(&tx, id)?)?;

        if let Some(title) = &input.title {
            validate::validate_title(title)?;
        }
        if let Some(description) = &input.description {
            validate::validate_description(description)?;
        }
        if let Some(deadline) = input.deadline {
            TaskPlanner::new(&mut graph, node, self.clock).set_deadline(deadline)?;
        }

        let task = graph.task_mut(node);
        if let Some(title) = &input.title {
            task.assign(TaskField::Title, title)?;
        }
        if let Some(description) = &input.description {
            task.assign(TaskField::Description, description)?;
        }

        task_repo::save(&tx, &mut graph)?;
        tx.commit()?;
        info!(task = %id, "task updated");
        Ok(graph.view(node))
    }

    /// Assign one field by name; deadline and completion timestamp are refused.
    pub fn set_field(&self, id: &TaskId, field: TaskField, value: &str) -> Result<TaskView> {
        let tx = self.conn.unchecked_transaction()?;
        let (mut graph, node) = self.owned(id, task_repo::get_with_ancestors(&tx, id)?)?;

        graph.task_mut(node).assign(field, value)?;

        task_repo::save(&tx, &mut graph)?;
        tx.commit()?;
        info!(task = %id, %field, "task field assigned");
        Ok(graph.view(node))
    }

    /// Strict completion: every subtask must already be finished.
    pub fn finish(&self, id: &TaskId) -> Result<TaskView> {
        let tx = self.conn.unchecked_transaction()?;
        let (mut graph, node) = self.owned(id, task_repo::get_with_lineage(&tx, id)?)?;

        graph.complete(node, self.clock.now())?;

        task_repo::save(&tx, &mut graph)?;
        tx.commit()?;
        info!(task = %id, "task finished");
        Ok(graph.view(node))
    }

    /// Forced completion of the task and its whole subtree.
    pub fn force_finish(&self, id: &TaskId) -> Result<TaskTree> {
        let tx = self.conn.unchecked_transaction()?;
        let (mut graph, node) = self.owned(id, task_repo::get_with_lineage(&tx, id)?)?;

        graph.force_complete(node, self.clock.now());

        task_repo::save(&tx, &mut graph)?;
        tx.commit()?;
        let tree = graph.to_tree(node);
        info!(task = %id, finished = tree.count(), "task force-finished");
        Ok(tree)
    }

    /// Delete a task and its subtree. Returns the deleted ids, the task first.
    pub fn delete(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        let tx = self.conn.unchecked_transaction()?;
        let (graph, node) = self.owned(id, task_repo::get_with_descendants(&tx, id)?)?;

        let mut descendants: Vec<TaskId> = graph.collect_descendant_ids(node).into_iter().collect();
        descendants.sort();

        task_repo::delete_task(&tx, id)?;
        tx.commit()?;

        let mut deleted = Vec::with_capacity(descendants.len() + 1);
        deleted.push(id.clone());
        deleted.extend(descendants);
        info!(task = %id, deleted = deleted.len(), "task deleted");
        Ok(deleted)
    }

    fn owned(
        &self,
        id: &TaskId,
        loaded: Option<(TaskGraph, NodeRef)>,
    ) -> Result<(TaskGraph, NodeRef)> {
        let (graph, node) = loaded.ok_or_else(|| TaskError::TaskNotFound(id.clone()))?;
        self.guard_owner(id, graph.task(node))?;
        Ok((graph, node))
    }

    /// `id` is the key the task was loaded by, so the error names a stored row.
    fn guard_owner(&self, id: &TaskId, task: &Task) -> Result<()> {
        if task.user_id() == self.user {
            return Ok(());
        }
        Err(TaskError::NotOwner {
            task: id.clone(),
            user: self.user,
        })
    }
}
