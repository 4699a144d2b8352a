mod actor;
mod messages;

use crate::events::{Output, ProcessStatus};
use crate::types::Command;
use actor::Actor;
use messages::WorkerMessage;
use std::{io, process::Stdio};
use tokio::{
    process,
    sync::{mpsc, oneshot},
};

/// Handle to the actor that owns one subordinate OS process.
///
/// When the last handle is dropped the actor kills the process if it is still running.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn spawn(output_tx: mpsc::UnboundedSender<Output>, command: &Command) -> io::Result<Self> {
        let mut child = process::Command::new(&command.program);
        child
            .args(&command.args)
            .envs(command.envs.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.dir {
            child.current_dir(dir);
        }
        let child = child.spawn()?;
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, output_tx, child);
        Ok(Self { sender })
    }

    pub async fn status(&self) -> ProcessStatus {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(WorkerMessage::GetStatus { response: tx });
        rx.await.unwrap_or(ProcessStatus::Lost)
    }

    pub async fn wait(&self) -> ProcessStatus {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(WorkerMessage::Wait { response: tx });
        rx.await.unwrap_or(ProcessStatus::Lost)
    }

    /// Kill the process. Returns false if it had already exited or was already being stopped.
    pub async fn stop(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(WorkerMessage::Stop { response: tx });
        rx.await.unwrap_or(false)
    }
}
