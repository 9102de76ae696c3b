//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::mission::MissionStatus;

#[derive(Parser)]
#[command(name = "helmsman")]
#[command(author, version, about = "Mission orchestration core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory holding mission documents and helmsman.toml
    #[arg(
        long,
        global = true,
        env = "HELMSMAN_DATA_DIR",
        default_value = ".helmsman"
    )]
    pub data_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP front end
    Serve {
        /// Bind address (overrides server.bind from helmsman.toml)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Execute a mission plan from a YAML file
    Run {
        /// Path to the plan file
        plan: PathBuf,

        /// Concurrent node dispatches (overrides scheduler.max_parallel)
        #[arg(long)]
        max_parallel: Option<usize>,
    },

    /// Show one mission's status and transition history
    Status {
        /// Mission ID
        mission_id: String,
    },

    /// List all missions
    List {
        /// Filter by status
        #[arg(long, value_enum)]
        status: Option<StatusFilterArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilterArg {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<StatusFilterArg> for MissionStatus {
    fn from(arg: StatusFilterArg) -> Self {
        match arg {
            StatusFilterArg::Pending => MissionStatus::Pending,
            StatusFilterArg::Running => MissionStatus::Running,
            StatusFilterArg::Completed => MissionStatus::Completed,
            StatusFilterArg::Failed => MissionStatus::Failed,
            StatusFilterArg::Cancelled => MissionStatus::Cancelled,
        }
    }
}
