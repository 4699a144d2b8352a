use crate::events::ProcessStatus;
use tokio::sync::oneshot;

pub enum WorkerMessage {
    GetStatus {
        response: oneshot::Sender<ProcessStatus>,
    },
    /// Resolves once the process has exited.
    Wait {
        response: oneshot::Sender<ProcessStatus>,
    },
    Stop {
        response: oneshot::Sender<bool>,
    },
}
