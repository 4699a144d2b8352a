use std::{io, path::PathBuf, result};
use thiserror;

use crate::types::JobName;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no script is registered under job '{0}'")]
    NotFound(JobName),
    #[error("'{0}' is not a valid job name")]
    InvalidJobName(String),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("process registry exited")]
    RegistryClosed,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
