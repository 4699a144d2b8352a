use std::{fmt, path::Path};
use uuid::Uuid;

use crate::error::{Error, Result};

pub type Program = String;
pub type Args = Vec<String>;
pub type Dir = String;
pub type Envs = Vec<(String, String)>;
pub type RunId = Uuid;
pub type OutputBlob = bytes::Bytes;

/// Name of a job, derived from the file name a script was uploaded under.
///
/// A valid name is a single path component, so `<scripts_dir>/<name>` never
/// escapes the scripts directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobName(String);

impl JobName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let is_valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(|c| c == '/' || c == '\\' || c == '\0');
        if is_valid {
            Ok(Self(name))
        } else {
            Err(Error::InvalidJobName(name))
        }
    }

    /// Derive a job name from an uploaded file's path, keeping only its final component.
    pub fn from_upload(path: &Path) -> Result<Self> {
        match path.file_name() {
            Some(file_name) => Self::new(file_name.to_string_lossy()),
            None => Err(Error::InvalidJobName(path.display().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Program, arguments and environment of a subordinate process.
#[derive(Clone, Debug)]
pub struct Command {
    pub program: Program,
    pub args: Args,
    pub dir: Option<Dir>,
    pub envs: Envs,
}

impl Command {
    pub fn new(program: impl Into<Program>) -> Self {
        Self {
            program: program.into(),
            args: Args::new(),
            dir: None,
            envs: Envs::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
