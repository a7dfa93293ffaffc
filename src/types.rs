use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::core::validate;
use crate::error::{Result, TaskError};
use crate::id::{TaskId, UserId};

/// Assignable task fields, as named at the update boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    Title,
    Description,
    Deadline,
    CompletedAt,
}

impl TaskField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Deadline => "deadline",
            Self::CompletedAt => "completed_at",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title" => Ok(Self::Title),
            "description" => Ok(Self::Description),
            "deadline" => Ok(Self::Deadline),
            "completed_at" | "pass_date" => Ok(Self::CompletedAt),
            other => Err(format!("unknown task field '{other}'")),
        }
    }
}

/// One node of a user's task tree.
///
/// Deadline and completion timestamp have no public setters: the deadline
/// changes only through `TaskPlanner`, completion only through
/// `TaskGraph::complete` / `TaskGraph::force_complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    id: Option<TaskId>,
    parent_id: Option<TaskId>,
    user_id: UserId,
    pub title: String,
    pub description: String,
    deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Raw column values used to rebuild a persisted task
pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub parent_id: Option<TaskId>,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn new(
        title: String,
        description: String,
        deadline: DateTime<Utc>,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            parent_id: None,
            user_id,
            title,
            description,
            deadline,
            created_at,
            completed_at: None,
        }
    }

    pub(crate) fn from_record(record: TaskRecord) -> Self {
        Self {
            id: Some(record.id),
            parent_id: record.parent_id,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            deadline: record.deadline,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }

    /// Identity assigned by persistence; `None` before the first save
    pub fn id(&self) -> Option<&TaskId> {
        self.id.as_ref()
    }

    pub fn parent_id(&self) -> Option<&TaskId> {
        self.parent_id.as_ref()
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_done(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Assign a field by name. Title and description are validated and
    /// written; deadline and completion timestamp are refused.
    pub fn assign(&mut self, field: TaskField, value: &str) -> Result<()> {
        match field {
            TaskField::Title => {
                validate::validate_title(value)?;
                self.title = value.to_string();
            }
            TaskField::Description => {
                validate::validate_description(value)?;
                self.description = value.to_string();
            }
            TaskField::Deadline | TaskField::CompletedAt => {
                return Err(TaskError::DirectMutationForbidden(field));
            }
        }
        Ok(())
    }

    pub(crate) fn set_deadline(&mut self, deadline: DateTime<Utc>) {
        self.deadline = deadline;
    }

    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
    }

    pub(crate) fn assign_id(&mut self, id: TaskId) {
        self.id = Some(id);
    }

    pub(crate) fn set_parent_id(&mut self, parent_id: Option<TaskId>) {
        self.parent_id = parent_id;
    }
}

/// Fields for a task that is about to be produced
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<FixedOffset>,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct CreateTaskInput {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<FixedOffset>,
    pub parent_id: Option<TaskId>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<DateTime<FixedOffset>>,
}

impl UpdateTaskInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.deadline.is_none()
    }
}

/// Which root trees to list for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootFilter {
    #[default]
    All,
    Active,
    Finished,
}

impl RootFilter {
    pub fn completed(self) -> Option<bool> {
        match self {
            Self::All => None,
            Self::Active => Some(false),
            Self::Finished => Some(true),
        }
    }
}

/// Serializable snapshot of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: Option<TaskId>,
    pub parent_id: Option<TaskId>,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl TaskView {
    pub fn new(task: &Task, depth: Option<u32>) -> Self {
        Self {
            id: task.id.clone(),
            parent_id: task.parent_id.clone(),
            user_id: task.user_id,
            title: task.title.clone(),
            description: task.description.clone(),
            deadline: task.deadline,
            created_at: task.created_at,
            completed_at: task.completed_at,
            completed: task.is_done(),
            depth,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTree {
    pub task: TaskView,
    pub children: Vec<TaskTree>,
}

impl TaskTree {
    /// Number of tasks in this tree, root included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TaskTree::count).sum::<usize>()
    }

    /// Number of finished tasks in this tree, root included
    pub fn count_completed(&self) -> usize {
        usize::from(self.task.completed)
            + self
                .children
                .iter()
                .map(TaskTree::count_completed)
                .sum::<usize>()
    }
}
