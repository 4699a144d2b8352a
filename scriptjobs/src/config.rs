use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SCRIPTS_DIR: &str = "uploads";
pub const DEFAULT_HISTORY_FILE: &str = "history.json";
pub const DEFAULT_MANIFEST_FILE: &str = "requirements.txt";
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a [`JobManager`](crate::JobManager) keeps its state and how it runs scripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// One file per job, named after the job.
    pub scripts_dir: PathBuf,
    pub history_path: PathBuf,
    /// Requirements file listing every package installed so far.
    pub manifest_path: PathBuf,
    /// Interpreter used both to run scripts and to invoke `-m pip`.
    pub python: String,
    pub run_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scripts_dir: DEFAULT_SCRIPTS_DIR.into(),
            history_path: DEFAULT_HISTORY_FILE.into(),
            manifest_path: DEFAULT_MANIFEST_FILE.into(),
            python: DEFAULT_PYTHON.to_string(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl Config {
    /// The default layout, rooted at `root` instead of the working directory.
    pub fn in_dir(root: &Path) -> Self {
        Self {
            scripts_dir: root.join(DEFAULT_SCRIPTS_DIR),
            history_path: root.join(DEFAULT_HISTORY_FILE),
            manifest_path: root.join(DEFAULT_MANIFEST_FILE),
            ..Self::default()
        }
    }
}
