use std::fmt;

use thiserror::Error;

use crate::id::{TaskId, UserId};
use crate::types::TaskField;

/// Which deadline ordering rule a candidate deadline broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineViolation {
    /// Candidate is not strictly after the current instant
    NotInFuture,
    /// Candidate is later than the parent's deadline
    ExceedsParent,
    /// Candidate is earlier than some descendant's deadline
    BelowDescendant,
    /// Candidate lies past the last representable year
    OutOfRange,
}

impl fmt::Display for DeadlineViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotInFuture => "deadline must be later than now",
            Self::ExceedsParent => "deadline cannot be later than the parent task's deadline",
            Self::BelowDescendant => "deadline cannot be earlier than a subtask's deadline",
            Self::OutOfRange => "deadline must fall on or before 9999-12-31",
        };
        f.write_str(msg)
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(DeadlineViolation),

    #[error("Maximum depth exceeded: task trees are limited to {max} levels")]
    MaxDepth { max: u32 },

    #[error("Cannot create a subtask under a finished task")]
    ParentFinished,

    #[error("Cannot finish task: {count} subtask(s) are not finished")]
    UnfinishedDescendant { count: usize },

    #[error("Field '{0}' cannot be assigned directly")]
    DirectMutationForbidden(TaskField),

    /// The loaded graph lacks an ancestor the operation needs
    #[error("Ancestor task {0} was not loaded")]
    MissingAncestor(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Parent task not found: {0}")]
    ParentNotFound(TaskId),

    #[error("Task {task} does not belong to user {user}")]
    NotOwner { task: TaskId, user: UserId },

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("{field} is too long ({len} characters, max {max})")]
    TextTooLong {
        field: TaskField,
        len: usize,
        max: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// Stable machine-readable code for the boundary layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDeadline(_) => "INVALID_DEADLINE",
            Self::MaxDepth { .. } => "MAX_DEPTH",
            Self::ParentFinished => "PARENT_FINISHED",
            Self::UnfinishedDescendant { .. } => "UNFINISHED_DESCENDANT",
            Self::DirectMutationForbidden(_) => "DIRECT_MUTATION_FORBIDDEN",
            Self::MissingAncestor(_) => "MISSING_ANCESTOR",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::ParentNotFound(_) => "PARENT_NOT_FOUND",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::EmptyTitle | Self::TextTooLong { .. } => "INVALID_FIELD_VALUE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by the request rather than by the environment
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::MissingAncestor(_)
                | Self::Database(_)
                | Self::Io(_)
                | Self::Json(_)
                | Self::Yaml(_)
                | Self::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
