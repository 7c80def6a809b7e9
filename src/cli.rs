use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::command::{self, Target, config::ConfigCommands};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "agentvm")]
#[command(about = "Run coding agents in isolated Multipass VMs or Docker containers")]
struct Cli {
    #[command(flatten)]
    target: Target,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and provision the instance, or start it if it exists
    #[command(visible_alias = "create")]
    Launch,

    /// Start a stopped instance
    Start,

    /// Stop a running instance
    Stop,

    /// Delete the instance and its data
    #[command(visible_aliases = ["destroy", "rm"])]
    Delete {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Mount a host directory into the VM (defaults to the current directory)
    Mount { path: Option<PathBuf> },

    /// Unmount a host directory from the VM (defaults to the current directory)
    #[command(visible_alias = "umount")]
    Unmount { path: Option<PathBuf> },

    /// Run a command inside the instance without a TTY
    #[command(disable_help_flag = true)]
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Open a shell (or run a command) in the current directory's mount
    #[command(disable_help_flag = true)]
    Ssh {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run Claude Code in the current directory's mount
    #[command(disable_help_flag = true)]
    Claude {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run Gemini CLI in the current directory's mount
    #[command(disable_help_flag = true)]
    Gemini {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show instance status
    #[command(visible_alias = "info")]
    Status,

    /// Show bootstrap (cloud-init) or container logs
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value_t = 100)]
        lines: usize,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },

    /// Re-apply git identity and commit signing inside the instance
    ConfigureGit,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

// --- Public Entry Point ---
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let target = &cli.target;

    match cli.command {
        Commands::Launch => command::launch::run(target),
        Commands::Start => command::lifecycle::start(target),
        Commands::Stop => command::lifecycle::stop(target),
        Commands::Delete { force } => command::delete::run(target, force),
        Commands::Mount { path } => command::mount::mount(target, path.as_deref()),
        Commands::Unmount { path } => command::mount::unmount(target, path.as_deref()),
        Commands::Exec { command } => command::session::exec(target, &command),
        Commands::Ssh { command } => command::session::interactive(target, command),
        Commands::Claude { args } => command::session::agent(target, "claude", args),
        Commands::Gemini { args } => command::session::agent(target, "gemini", args),
        Commands::Status => command::status::status(target),
        Commands::Logs { lines, follow } => command::status::logs(target, lines, follow),
        Commands::ConfigureGit => command::status::configure_git(target),
        Commands::Config { command } => command::config::run(target, command),
    }
}
