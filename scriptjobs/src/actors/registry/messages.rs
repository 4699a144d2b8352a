use super::{ProcessHandle, StartOutcome};
use crate::error;
use crate::types::{Command, JobName, RunId};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum RegistryMessage {
    Start {
        job_name: JobName,
        command: Command,
        response: oneshot::Sender<error::Result<StartOutcome>>,
    },
    Stop {
        job_name: JobName,
        response: oneshot::Sender<bool>,
    },
    Get {
        job_name: JobName,
        response: oneshot::Sender<Option<ProcessHandle>>,
    },
    Release {
        job_name: JobName,
        run_id: RunId,
        response: oneshot::Sender<bool>,
    },
}
