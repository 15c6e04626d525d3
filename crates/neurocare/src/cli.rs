//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};

/// NeuroCare therapy companion
///
/// Run vibration therapy sessions, review history and get recommendations.
#[derive(Parser, Debug)]
#[command(name = "neurocare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// User to act as (overrides the config file)
    #[arg(long, global = true, env = "NEUROCARE_USER_ID")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a therapy session
    Session(SessionCommand),

    /// Session history (list, delete, clear)
    History(HistoryCommand),

    /// Frequency and duration recommendations from past sessions
    Recommend {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Configuration file (show, init)
    Config(ConfigCommand),

    /// Progress statistics
    Progress {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a session, let it run, then stop and save it
    Run {
        /// How long to run, in seconds
        #[arg(short, long, default_value_t = 60)]
        seconds: u64,

        /// Vibration intensity (0-100)
        #[arg(short, long)]
        intensity: Option<i64>,

        /// End with an emergency stop instead of a normal stop
        #[arg(long)]
        emergency: bool,

        /// Simulate a disconnected device
        #[arg(long)]
        disconnected: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// History Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub action: HistoryAction,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List past sessions, newest first
    List {
        /// Maximum number of sessions to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete one session
    Delete {
        /// Session ID
        session_id: String,
    },

    /// Delete every session for the current user
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
