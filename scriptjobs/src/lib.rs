//! Submit scripts, install what they import, run them as subordinate processes and keep
//! a persisted history of every submission and run.

mod actors;
pub mod config;
pub mod error;
mod events;
pub mod executor;
mod fs;
pub mod history;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod scanner;
pub mod types;

// re-export the registry handle as if it is the registry itself.
pub use actors::registry::{ProcessHandle, ProcessRegistry, StartOutcome};
pub use config::Config;
pub use error::{Error, Result};
pub use events::ProcessStatus;
pub use executor::{CancelHandle, JobExecutor, RunOutcome, RunResult, RunningJob};
pub use history::{HistoryEntry, HistoryStore};
pub use installer::{DependencyInstaller, InstallOutcome, PackageInstaller, PipInstaller};
pub use manager::JobManager;
pub use types::{Command, JobName};
