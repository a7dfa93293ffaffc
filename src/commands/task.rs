use chrono::{DateTime, Duration, FixedOffset};
use clap::{Args, Subcommand};
use rusqlite::Connection;

use crate::clock::Clock;
use crate::core::TaskService;
use crate::error::{DeadlineViolation, Result, TaskError};
use crate::id::{TaskId, UserId};
use crate::types::{CreateTaskInput, RootFilter, TaskField, TaskTree, TaskView, UpdateTaskInput};

/// Parse TaskId from CLI string (requires prefix)
fn parse_task_id(s: &str) -> std::result::Result<TaskId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// A deadline as typed on the command line: absolute, or relative to now
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlineArg {
    At(DateTime<FixedOffset>),
    In(Duration),
}

impl DeadlineArg {
    /// Relative offsets are anchored to `clock` at the moment of the call.
    pub fn resolve(self, clock: &dyn Clock) -> Result<DateTime<FixedOffset>> {
        match self {
            Self::At(at) => Ok(at),
            Self::In(offset) => clock
                .now()
                .checked_add_signed(offset)
                .map(|at| at.fixed_offset())
                .ok_or(TaskError::InvalidDeadline(DeadlineViolation::OutOfRange)),
        }
    }
}

/// RFC 3339 (`2030-01-31T18:00:00+02:00`) or `<n><unit>` with unit m/h/d/w
pub fn parse_deadline(s: &str) -> std::result::Result<DeadlineArg, String> {
    let s = s.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(DeadlineArg::At(at));
    }

    let invalid = || format!("invalid deadline '{s}': expected RFC 3339 or e.g. 90m, 12h, 3d, 2w");
    let split = s.len().checked_sub(1).ok_or_else(invalid)?;
    if !s.is_char_boundary(split) {
        return Err(invalid());
    }
    let (amount, unit) = s.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    let offset = match unit {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    offset.map(DeadlineArg::In).ok_or_else(invalid)
}

#[derive(Subcommand, Clone)]
pub enum TaskCommand {
    /// Create a root task, or a subtask with --parent
    Create(CreateArgs),
    /// Show a single task
    Get {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Show a task with its whole subtree
    Tree {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// List your root tasks with their subtrees
    List(ListArgs),
    /// Change a task's title, description or deadline
    Update(UpdateArgs),
    /// Assign a single field by name
    Set(SetArgs),
    /// Mark a task finished
    Finish(FinishArgs),
    /// Delete a task and all of its subtasks
    Delete {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    pub title: String,

    #[arg(short = 'd', long, default_value = "")]
    pub description: String,

    /// RFC 3339 timestamp or relative offset (90m, 12h, 3d, 2w)
    #[arg(long, value_parser = parse_deadline)]
    pub deadline: DeadlineArg,

    #[arg(long, value_parser = parse_task_id)]
    pub parent: Option<TaskId>,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    /// Only trees whose root is not finished
    #[arg(long, conflicts_with = "finished")]
    pub active: bool,

    /// Only trees whose root is finished
    #[arg(long)]
    pub finished: bool,
}

impl ListArgs {
    fn filter(&self) -> RootFilter {
        if self.active {
            RootFilter::Active
        } else if self.finished {
            RootFilter::Finished
        } else {
            RootFilter::All
        }
    }
}

#[derive(Args, Clone)]
#[command(group = clap::ArgGroup::new("changes").required(true).multiple(true))]
pub struct UpdateArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(long, group = "changes")]
    pub title: Option<String>,

    #[arg(short = 'd', long, group = "changes")]
    pub description: Option<String>,

    #[arg(long, value_parser = parse_deadline, group = "changes")]
    pub deadline: Option<DeadlineArg>,
}

#[derive(Args, Clone)]
pub struct SetArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    /// title, description, deadline or completed_at
    pub field: TaskField,

    pub value: String,
}

#[derive(Args, Clone)]
pub struct FinishArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    /// Also finish every unfinished subtask
    #[arg(long)]
    pub force: bool,
}

pub enum TaskResult {
    One(TaskView),
    Tree(TaskTree),
    Trees(Vec<TaskTree>),
    Deleted(Vec<TaskId>),
}

pub fn handle(
    conn: &Connection,
    clock: &dyn Clock,
    user: UserId,
    cmd: TaskCommand,
) -> Result<TaskResult> {
    let svc = TaskService::new(conn, clock, user);

    match cmd {
        TaskCommand::Create(args) => {
            let input = CreateTaskInput {
                title: args.title,
                description: args.description,
                deadline: args.deadline.resolve(clock)?,
                parent_id: args.parent,
            };
            Ok(TaskResult::One(svc.create(&input)?))
        }

        TaskCommand::Get { id } => Ok(TaskResult::One(svc.get(&id)?)),

        TaskCommand::Tree { id } => Ok(TaskResult::Tree(svc.tree(&id)?)),

        TaskCommand::List(args) => Ok(TaskResult::Trees(svc.list_roots(args.filter())?)),

        TaskCommand::Update(args) => {
            let input = UpdateTaskInput {
                title: args.title,
                description: args.description,
                deadline: args.deadline.map(|d| d.resolve(clock)).transpose()?,
            };
            if input.is_empty() {
                return Ok(TaskResult::One(svc.get(&args.id)?));
            }
            Ok(TaskResult::One(svc.update(&args.id, &input)?))
        }

        TaskCommand::Set(args) => Ok(TaskResult::One(svc.set_field(
            &args.id,
            args.field,
            &args.value,
        )?)),

        TaskCommand::Finish(args) if args.force => {
            Ok(TaskResult::Tree(svc.force_finish(&args.id)?))
        }
        TaskCommand::Finish(args) => Ok(TaskResult::One(svc.finish(&args.id)?)),

        TaskCommand::Delete { id } => Ok(TaskResult::Deleted(svc.delete(&id)?)),
    }
}
