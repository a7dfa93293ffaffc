use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{debug, error, warn};

use tasktree::clock::SystemClock;
use tasktree::commands::{task, TaskCommand, TaskResult};
use tasktree::config::Config;
use tasktree::error::{Result, TaskError};
use tasktree::id::UserId;
use tasktree::{db, logging};

mod output;

use output::Printer;

#[derive(Parser)]
#[command(name = "tt")]
#[command(version)]
#[command(
    about = "tasktree - hierarchical tasks with deadlines",
    long_about = r#"
tasktree (tt) - Personal task trees with nested deadlines.

Rules:
  • Trees are at most 5 levels deep
  • A subtask's deadline never exceeds its parent's
  • A task finishes only after all of its subtasks (or with --force)

Environment:
  TASKTREE_DB_PATH  Override database location
  TASKTREE_USER     Acting user id
  TASKTREE_LOG      Log filter (e.g. debug, tasktree=info)
  TASKTREE_CONFIG   Config file location
  NO_COLOR          Disable colored output
"#
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output in JSON format (for programmatic use)
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Override database path (default: ./.tasktree/tasks.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: <config dir>/tasktree/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, global = true)]
    user: Option<UserId>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Task management (create, plan, finish, delete)
    #[command(subcommand)]
    Task(TaskCommand),

    /// Generate shell completions
    #[command(
        about = "Generate shell completions",
        long_about = r#"
Generate shell completions for tt CLI.

Examples:
  tt completions bash > ~/.local/share/bash-completion/completions/tt
  tt completions zsh > ~/.zfunc/_tt
  tt completions fish > ~/.config/fish/completions/tt.fish
"#
    )]
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },

    /// Initialize database
    #[command(
        about = "Initialize database",
        long_about = r#"
Initialize the tasktree database.

The database is created at:
  1. --db (if given)
  2. TASKTREE_DB_PATH (if set)
  3. db_path from the config file
  4. CWD/.tasktree/tasks.db (fallback)

Usually runs automatically on first command.
"#
    )]
    Init,
}

fn main() {
    let cli = Cli::parse();

    // PRECONDITION: Completions bypass normal output flow - raw shell script to stdout
    if let Command::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "tt", &mut io::stdout());
        return;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&cli, &e),
    };

    let level = logging::effective_level(cli.verbose, config.log_level());
    logging::init(level, output::should_use_color_stderr(cli.no_color));

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path());
    let user = cli.user.unwrap_or_else(|| config.user());
    debug!(db = %db_path.display(), %user, "resolved settings");

    match run(&cli.command, &db_path, user) {
        Ok(output) => {
            if cli.json {
                println!("{}", output);
            } else {
                let printer = Printer::new(cli.no_color);
                printer.print(&cli.command, &output);
            }
        }
        Err(e) => {
            if e.is_rejection() {
                warn!(code = e.code(), "{e}");
            } else {
                error!(code = e.code(), "{e}");
            }
            exit_with(&cli, &e);
        }
    }
}

fn exit_with(cli: &Cli, e: &TaskError) -> ! {
    if cli.json {
        let err = serde_json::json!({ "error": e.to_string(), "code": e.code() });
        eprintln!("{}", err);
    } else {
        let printer = Printer::new_for_stderr(cli.no_color);
        printer.print_error(&format!("Error: {}", e));
    }
    std::process::exit(1);
}

fn run(command: &Command, db_path: &Path, user: UserId) -> Result<String> {
    match command {
        Command::Init => {
            db::open_db(db_path)?;
            Ok(serde_json::json!({ "initialized": true, "path": db_path }).to_string())
        }
        Command::Task(cmd) => {
            let conn = db::open_db(db_path)?;
            match task::handle(&conn, &SystemClock, user, cmd.clone())? {
                TaskResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
                TaskResult::Tree(tree) => Ok(serde_json::to_string_pretty(&tree)?),
                TaskResult::Trees(trees) => Ok(serde_json::to_string_pretty(&trees)?),
                TaskResult::Deleted(ids) => Ok(serde_json::to_string_pretty(&ids)?),
            }
        }
        // PRECONDITION: Completions handled in main() before run() is called
        Command::Completions { .. } => unreachable!("completions handled before run()"),
    }
}
