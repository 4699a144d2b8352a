use clap::{Parser, Subcommand};
use scriptjobs::config::{self, Config};
use std::path::PathBuf;
use std::time::Duration;

/// Submit scripts, install their imports, run them and browse the execution history
#[derive(Debug, Parser)]
#[clap(name = "scriptjobs", version)]
pub struct ArgParser {
    /// Directory holding one uploaded script per job
    #[clap(long, parse(from_os_str), env = "SCRIPTJOBS_SCRIPTS_DIR", default_value = config::DEFAULT_SCRIPTS_DIR)]
    pub scripts_dir: PathBuf,
    /// JSON file the execution history is kept in
    #[clap(long = "history", parse(from_os_str), env = "SCRIPTJOBS_HISTORY", default_value = config::DEFAULT_HISTORY_FILE)]
    pub history_path: PathBuf,
    /// Requirements file listing every package installed so far
    #[clap(long = "manifest", parse(from_os_str), env = "SCRIPTJOBS_MANIFEST", default_value = config::DEFAULT_MANIFEST_FILE)]
    pub manifest_path: PathBuf,
    /// Python interpreter used to run scripts and pip
    #[clap(long, env = "SCRIPTJOBS_PYTHON", default_value = config::DEFAULT_PYTHON)]
    pub python: String,
    /// Seconds a run may take before it is reported as timed out
    #[clap(long, env = "SCRIPTJOBS_TIMEOUT_SECS", default_value = "60")]
    pub timeout_secs: u64,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

impl ArgParser {
    pub fn config(&self) -> Config {
        Config {
            scripts_dir: self.scripts_dir.clone(),
            history_path: self.history_path.clone(),
            manifest_path: self.manifest_path.clone(),
            python: self.python.clone(),
            run_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// upload a script and install the packages it imports
    Submit {
        /// path of the script to upload
        #[clap(parse(from_os_str))]
        file: PathBuf,

        #[clap(long)]
        /// job name to store the script under, defaults to the file name
        name: Option<String>,

        #[clap(long)]
        /// run the script right after a successful install
        run: bool,
    },
    /// run a submitted script; Ctrl-C stops it
    Run {
        /// job name
        name: String,
    },
    /// stop a job's script, remove it and forget its history
    Delete {
        /// job name
        name: String,
    },
    /// print the execution history, most recent first
    List,
}
