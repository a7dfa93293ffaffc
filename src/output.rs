use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Style};

use tasktree::commands::TaskCommand;
use tasktree::id::TaskId;
use tasktree::types::{TaskTree, TaskView};

use crate::Command;

/// Task status for display classification
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TaskStatus {
    Completed,
    Overdue,
    Active,
}

impl TaskStatus {
    fn classify(task: &TaskView, now: DateTime<Utc>) -> Self {
        if task.completed {
            Self::Completed
        } else if task.deadline <= now {
            Self::Overdue
        } else {
            Self::Active
        }
    }
}

#[derive(Default)]
struct TreeStats {
    completed: usize,
    overdue: usize,
    active: usize,
}

impl TreeStats {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Overdue => self.overdue += 1,
            TaskStatus::Active => self.active += 1,
        }
    }

    fn total(&self) -> usize {
        self.completed + self.overdue + self.active
    }
}

/// Color policy: --no-color > NO_COLOR env > TERM=dumb > !isatty > default (color)
fn should_use_color_for(no_color_flag: bool, is_tty: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("TERM").ok().as_deref() == Some("dumb") {
        return false;
    }
    is_tty
}

pub fn should_use_color(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stdout().is_terminal())
}

pub fn should_use_color_stderr(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stderr().is_terminal())
}

struct Colors {
    task_id: Style,
    completed: Style,
    active: Style,
    overdue: Style,
    root: Style,
    tree_line: Style,
    error: Style,
}

impl Colors {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                task_id: Style::new().cyan().dimmed(),
                completed: Style::new().green(),
                active: Style::new().yellow(),
                overdue: Style::new().red(),
                root: Style::new().bold(),
                tree_line: Style::new().dimmed(),
                error: Style::new().red().bold(),
            }
        } else {
            Self {
                task_id: Style::new(),
                completed: Style::new(),
                active: Style::new(),
                overdue: Style::new(),
                root: Style::new(),
                tree_line: Style::new(),
                error: Style::new(),
            }
        }
    }
}

/// Handles human-readable CLI output.
///
/// Command results arrive as the same JSON that `--json` prints and are
/// parsed back here, so both modes always describe identical data.
pub struct Printer {
    colors: Colors,
    now: DateTime<Utc>,
}

impl Printer {
    /// Create printer for stdout (standard output)
    pub fn new(no_color_flag: bool) -> Self {
        Self::with_color(should_use_color(no_color_flag))
    }

    /// Create printer for stderr (error output)
    pub fn new_for_stderr(no_color_flag: bool) -> Self {
        Self::with_color(should_use_color_stderr(no_color_flag))
    }

    fn with_color(use_color: bool) -> Self {
        Self {
            colors: Colors::new(use_color),
            now: Utc::now(),
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", message.style(self.colors.error));
    }

    fn fmt_id(&self, id: Option<&TaskId>) -> String {
        let id = id.map_or_else(|| "(unsaved)".to_string(), ToString::to_string);
        format!("{}", id.style(self.colors.task_id))
    }

    fn status_symbol_style(&self, status: TaskStatus) -> (&'static str, Style) {
        match status {
            TaskStatus::Completed => ("✓", self.colors.completed),
            TaskStatus::Overdue => ("!", self.colors.overdue),
            TaskStatus::Active => ("○", self.colors.active),
        }
    }

    pub fn print(&self, command: &Command, output: &str) {
        match command {
            Command::Init => self.print_init(output),
            Command::Task(TaskCommand::Delete { .. }) => self.print_deleted(output),
            Command::Task(TaskCommand::Tree { .. }) => self.print_task_tree(output),
            Command::Task(TaskCommand::List(_)) => self.print_task_tree(output),
            Command::Task(TaskCommand::Finish(args)) if args.force => self.print_task_tree(output),
            Command::Task(_) => self.print_task(output),
            // PRECONDITION: Completions handled in main() before print() is called
            Command::Completions { .. } => unreachable!("completions handled before print()"),
        }
    }

    fn print_init(&self, output: &str) {
        let path = serde_json::from_str::<serde_json::Value>(output)
            .ok()
            .and_then(|json| json.get("path").and_then(|p| p.as_str()).map(String::from));
        match path {
            Some(path) => println!("Initialized task database at {path}"),
            None => println!("Initialized task database"),
        }
    }

    fn print_deleted(&self, output: &str) {
        if let Ok(ids) = serde_json::from_str::<Vec<TaskId>>(output) {
            let (first, rest) = match ids.split_first() {
                Some(split) => split,
                None => return,
            };
            println!("Deleted task {}", self.fmt_id(Some(first)));
            if !rest.is_empty() {
                println!("  and {} subtask(s):", rest.len());
                for id in rest {
                    println!("    {}", self.fmt_id(Some(id)));
                }
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_task(&self, output: &str) {
        if let Ok(task) = serde_json::from_str::<TaskView>(output) {
            let status = TaskStatus::classify(&task, self.now);
            let (status_label, status_style) = match status {
                TaskStatus::Completed => ("finished", self.colors.completed),
                TaskStatus::Overdue => ("overdue", self.colors.overdue),
                TaskStatus::Active => ("active", self.colors.active),
            };

            println!(
                "Task: {} ({})",
                self.fmt_id(task.id.as_ref()),
                status_label.style(status_style)
            );
            println!("  Title: {}", task.title);
            if !task.description.is_empty() {
                println!("  Description: {}", task.description);
            }
            println!("  Deadline: {}", task.deadline.to_rfc3339());
            if let Some(completed_at) = task.completed_at {
                println!("  Finished: {}", completed_at.to_rfc3339());
            }
            if let Some(ref parent) = task.parent_id {
                println!("  Parent: {}", self.fmt_id(Some(parent)));
            }
            if let Some(depth) = task.depth {
                println!("  Depth: {}", depth);
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_task_tree(&self, output: &str) {
        // Try single tree first, then array of trees
        if let Ok(tree) = serde_json::from_str::<TaskTree>(output) {
            let mut stats = TreeStats::default();
            self.count_tree_stats(&tree, &mut stats);
            self.print_tree_node(&tree, "", true);
            self.print_progress_summary(&stats);
        } else if let Ok(trees) = serde_json::from_str::<Vec<TaskTree>>(output) {
            if trees.is_empty() {
                println!("No tasks found");
                return;
            }
            let mut stats = TreeStats::default();
            for (i, tree) in trees.iter().enumerate() {
                self.count_tree_stats(tree, &mut stats);
                self.print_tree_node(tree, "", true);
                if i < trees.len() - 1 {
                    println!();
                }
            }
            self.print_progress_summary(&stats);
        } else {
            println!("{}", output);
        }
    }

    fn count_tree_stats(&self, node: &TaskTree, stats: &mut TreeStats) {
        stats.add(TaskStatus::classify(&node.task, self.now));
        for child in &node.children {
            self.count_tree_stats(child, stats);
        }
    }

    fn print_tree_node(&self, tree: &TaskTree, prefix: &str, is_last: bool) {
        let status = TaskStatus::classify(&tree.task, self.now);
        let (status_sym, status_style) = self.status_symbol_style(status);

        let connector = if is_last { "└─" } else { "├─" };
        let tree_prefix = format!("{}", prefix.style(self.colors.tree_line));
        let tree_connector = format!("{}", connector.style(self.colors.tree_line));

        let title = if tree.task.parent_id.is_none() {
            format!("{}", tree.task.title.style(self.colors.root))
        } else {
            tree.task.title.clone()
        };

        println!(
            "{}{} [{}] {} - {} (due {})",
            tree_prefix,
            tree_connector,
            status_sym.style(status_style),
            self.fmt_id(tree.task.id.as_ref()),
            title,
            tree.task.deadline.format("%Y-%m-%d %H:%M"),
        );

        let new_prefix = format!("{}{}  ", prefix, if is_last { " " } else { "│" });
        for (i, child) in tree.children.iter().enumerate() {
            let is_last_child = i == tree.children.len() - 1;
            self.print_tree_node(child, &new_prefix, is_last_child);
        }
    }

    /// Print progress summary footer: "X/Y finished | Z overdue | W active"
    fn print_progress_summary(&self, stats: &TreeStats) {
        println!();
        println!(
            "{}/{} finished | {} overdue | {} active",
            stats.completed.style(self.colors.completed),
            stats.total(),
            stats.overdue.style(self.colors.overdue),
            stats.active.style(self.colors.active),
        );
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tasktree::id::UserId;

    fn view(completed: bool, deadline: DateTime<Utc>) -> TaskView {
        TaskView {
            id: Some(TaskId::new()),
            parent_id: None,
            user_id: UserId::new(1),
            title: "Task".to_string(),
            description: String::new(),
            deadline,
            created_at: deadline - Duration::days(1),
            completed_at: completed.then_some(deadline),
            completed,
            depth: Some(1),
        }
    }

    #[test]
    fn test_no_color_flag_wins() {
        assert!(!should_use_color_for(true, true));
    }

    #[test]
    fn test_status_classification() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let past = now - Duration::hours(1);
        let future = now + Duration::hours(1);

        assert_eq!(TaskStatus::classify(&view(true, past), now), TaskStatus::Completed);
        assert_eq!(TaskStatus::classify(&view(false, past), now), TaskStatus::Overdue);
        assert_eq!(TaskStatus::classify(&view(false, now), now), TaskStatus::Overdue);
        assert_eq!(TaskStatus::classify(&view(false, future), now), TaskStatus::Active);
    }

    #[test]
    fn test_tree_stats_cover_every_node() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let tree = TaskTree {
            task: view(false, now + Duration::days(3)),
            children: vec![
                TaskTree {
                    task: view(true, now + Duration::days(1)),
                    children: vec![],
                },
                TaskTree {
                    task: view(false, now - Duration::days(1)),
                    children: vec![],
                },
            ],
        };
        let printer = Printer {
            colors: Colors::new(false),
            now,
        };
        let mut stats = TreeStats::default();
        printer.count_tree_stats(&tree, &mut stats);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.active, 1);
    }
}
