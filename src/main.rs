//! # taskroster
//!
//! Task scheduling and registration for healthcare facility staff, from the
//! terminal. Managers publish tasks with a start time, a duration and a
//! registration deadline; employees register for open tasks; once the
//! deadline passes one registrant is assigned automatically.
//!
//! ## Usage
//!
//! **Session**
//! ```bash
//! taskroster login manager@example.com
//! taskroster whoami
//! taskroster signup "Jane Doe" jane@example.com --facility "Central Hospital"
//! ```
//!
//! **Tasks (managers)**
//! ```bash
//! taskroster task add "Night shift" --start "2025-12-01 22:00" -H 8 --deadline 2025-11-28
//! taskroster task add --template triage --start "2025-12-02 08:00"
//! printf 'Inventory|Ward B\nFire drill|' | taskroster task batch --start 2025-12-05
//! taskroster task edit 3 --minutes 30
//! taskroster task assign 3 2
//! ```
//!
//! **Tasks (employees)**
//! ```bash
//! taskroster task list --status pending
//! taskroster task register 3
//! taskroster task complete 3
//! ```
//!
//! ## Data Storage
//!
//! State lives as JSON files (`users.json`, `tasks.json`,
//! `taskTemplates.json`, `user.json`) in your local data directory:
//! *   Linux: `~/.local/share/taskroster/`
//! *   macOS: `~/Library/Application Support/taskroster/`
//! *   Windows: `%LOCALAPPDATA%\taskroster\`
//!
//! Override it with the `TASKROSTER_DATA` environment variable. Set
//! `TASKROSTER_ASSIGNMENT=first` to assign the earliest registrant instead of
//! a random one, and `RUST_LOG=info` to see what changed.

use std::io;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use taskroster::commands::*;
use taskroster::models::{Role, TaskStatus};
use taskroster::{Config, JsonFileStorage, Result, Roster};

#[derive(Parser)]
#[command(name = "taskroster")]
#[command(about = "Task scheduling and registration for facility staff", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in by email
    Login {
        email: String,
        /// Accepted but not checked
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// End the current session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Create an employee account and log in
    Signup {
        name: String,
        email: String,
        /// Hospital or health center
        #[arg(short, long)]
        facility: Option<String>,
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage task templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Assign tasks whose registration deadline has passed
    Sweep,
    /// Reset the data directory (delete users, tasks and templates)
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task
    Add {
        /// Task title (quoted if it has spaces); optional with --template
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Start, YYYY-MM-DD HH:MM (local time)
        #[arg(short, long)]
        start: String,
        /// Duration hours (0-24)
        #[arg(short = 'H', long)]
        hours: Option<u32>,
        /// Duration minutes (0-59)
        #[arg(short = 'M', long)]
        minutes: Option<u32>,
        /// End, instead of a duration
        #[arg(short, long)]
        end: Option<String>,
        /// Registration deadline; defaults to 7 days before the start
        #[arg(short = 'D', long)]
        deadline: Option<String>,
        /// Start from a saved template
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Create tasks from stdin, one "title|description" per line
    Batch {
        #[arg(short, long)]
        start: String,
        #[arg(short = 'D', long)]
        deadline: Option<String>,
        #[arg(short = 'H', long, default_value_t = 1)]
        hours: u32,
        #[arg(short = 'M', long, default_value_t = 0)]
        minutes: u32,
    },
    /// List tasks
    List {
        /// Only pending, assigned or completed tasks
        #[arg(short, long)]
        status: Option<TaskStatus>,
        /// Only tasks you created, registered for or were assigned
        #[arg(short, long)]
        mine: bool,
        /// Only tasks starting on this day (YYYY-MM-DD)
        #[arg(short, long)]
        on: Option<String>,
    },
    /// Show a task and its registrants
    Show { id: u64 },
    /// Edit a task
    Edit {
        id: u64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        start: Option<String>,
        #[arg(short = 'H', long)]
        hours: Option<u32>,
        #[arg(short = 'M', long)]
        minutes: Option<u32>,
        #[arg(short = 'D', long)]
        deadline: Option<String>,
    },
    /// Delete a task
    Remove { id: u64 },
    /// Register for a pending task
    Register { id: u64 },
    /// Withdraw a registration
    Unregister { id: u64 },
    /// Assign a task to one of its registrants
    Assign { id: u64, user: u64 },
    /// Mark your assigned task as completed
    Complete { id: u64 },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Save a template (replaces one with the same name)
    Add {
        name: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short = 'H', long, default_value_t = 1)]
        hours: u32,
        #[arg(short = 'M', long, default_value_t = 0)]
        minutes: u32,
    },
    /// List templates
    List,
    /// Remove a template
    Remove { name: String },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        name: String,
        email: String,
        #[arg(short, long, default_value = "employee")]
        role: Role,
        #[arg(short, long)]
        facility: Option<String>,
    },
    /// List users
    List {
        /// Filter by name, email or facility
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Change a user's role (manager, employee)
    Role { id: u64, role: Role },
    /// Activate or deactivate a user (active, inactive)
    Status { id: u64, status: String },
    /// Delete a user
    Remove { id: u64 },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(command: Commands, config: &Config) -> Result<()> {
    let mut storage = JsonFileStorage::open(&config.data_dir)?;
    if let Commands::Reset { force } = command {
        return cmd_reset(&mut storage, force);
    }
    let mut roster = Roster::open(storage, config)?;
    match command {
        Commands::Login { email, password } => cmd_login(&mut roster, email, password),
        Commands::Logout => cmd_logout(&mut roster),
        Commands::Whoami => cmd_whoami(&roster),
        Commands::Signup { name, email, facility, password } => {
            cmd_signup(&mut roster, name, email, facility, password)
        }
        Commands::Task { command } => match command {
            TaskCommands::Add { title, description, start, hours, minutes, end, deadline, template } => {
                cmd_task_add(&mut roster, title, description, start, hours, minutes, end, deadline, template)
            }
            TaskCommands::Batch { start, deadline, hours, minutes } => {
                cmd_task_batch(&mut roster, start, deadline, hours, minutes)
            }
            TaskCommands::List { status, mine, on } => cmd_task_list(&roster, status, mine, on),
            TaskCommands::Show { id } => cmd_task_show(&roster, id),
            TaskCommands::Edit { id, title, description, start, hours, minutes, deadline } => {
                cmd_task_edit(&mut roster, id, title, description, start, hours, minutes, deadline)
            }
            TaskCommands::Remove { id } => cmd_task_remove(&mut roster, id),
            TaskCommands::Register { id } => cmd_task_register(&mut roster, id),
            TaskCommands::Unregister { id } => cmd_task_unregister(&mut roster, id),
            TaskCommands::Assign { id, user } => cmd_task_assign(&mut roster, id, user),
            TaskCommands::Complete { id } => cmd_task_complete(&mut roster, id),
        },
        Commands::Template { command } => match command {
            TemplateCommands::Add { name, title, description, hours, minutes } => {
                cmd_template_add(&mut roster, name, title, description, hours, minutes)
            }
            TemplateCommands::List => cmd_template_list(&roster),
            TemplateCommands::Remove { name } => cmd_template_remove(&mut roster, name),
        },
        Commands::User { command } => match command {
            UserCommands::Add { name, email, role, facility } => {
                cmd_user_add(&mut roster, name, email, role, facility)
            }
            UserCommands::List { search } => cmd_user_list(&roster, search),
            UserCommands::Role { id, role } => cmd_user_role(&mut roster, id, role),
            UserCommands::Status { id, status } => cmd_user_status(&mut roster, id, status),
            UserCommands::Remove { id } => cmd_user_remove(&mut roster, id),
        },
        Commands::Sweep => cmd_sweep(&mut roster),
        Commands::Reset { .. } | Commands::Completions { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = &cli.command {
        let shell_enum = match shell.as_str() {
            "bash" => Shell::Bash,
            "zsh" => Shell::Zsh,
            "fish" => Shell::Fish,
            "powershell" => Shell::PowerShell,
            "elvish" => Shell::Elvish,
            _ => {
                eprintln!("Unsupported shell: {}", shell);
                std::process::exit(2);
            }
        };
        let mut cmd = Cli::command();
        generate(shell_enum, &mut cmd, "taskroster", &mut io::stdout());
        return;
    }

    let result = Config::from_env().and_then(|config| run(cli.command, &config));
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
