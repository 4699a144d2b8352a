use super::messages::WorkerMessage;
use crate::events::{Output, ProcessStatus};
use crate::types::OutputBlob;

use bytes::BytesMut;
use futures::future::FutureExt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    kill_tx: Option<oneshot::Sender<()>>,
    status: ProcessStatus,
    waiters: Vec<oneshot::Sender<ProcessStatus>>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        output_tx: mpsc::UnboundedSender<Output>,
        child: Child,
    ) {
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(async move {
            let actor = Self {
                inbox,
                kill_tx: Some(kill_tx),
                status: ProcessStatus::Running,
                waiters: Vec::new(),
            };
            actor.run(output_tx, kill_rx, child).await;
        });
    }

    async fn run(
        mut self,
        output_tx: mpsc::UnboundedSender<Output>,
        kill_rx: oneshot::Receiver<()>,
        mut child: Child,
    ) {
        let (exit_tx, exit_rx) = oneshot::channel();
        let maybe_stdout = child.stdout.take();
        let maybe_stderr = child.stderr.take();

        tokio::spawn(supervise(child, kill_rx, exit_tx));

        if let Some(stdout) = maybe_stdout {
            tokio::spawn(pipe_output(stdout, output_tx.clone(), Output::Stdout));
        }
        if let Some(stderr) = maybe_stderr {
            tokio::spawn(pipe_output(stderr, output_tx.clone(), Output::Stderr));
        }
        // the broadcaster sees end-of-output once both pipes are drained
        drop(output_tx);

        self.handle_messages(exit_rx).await;
    }

    async fn handle_messages(&mut self, exit_rx: oneshot::Receiver<ProcessStatus>) {
        use WorkerMessage::*;
        let mut exit_rx = exit_rx.fuse();
        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(GetStatus { response }) => {
                            let _ = response.send(self.status);
                        }
                        Some(Wait { response }) => {
                            if self.status.is_running() {
                                self.waiters.push(response);
                            } else {
                                let _ = response.send(self.status);
                            }
                        }
                        Some(Stop { response }) => {
                            let _ = response.send(self.kill());
                        }
                        None => {
                            // every handle dropped, don't leave the child behind
                            self.kill();
                            return;
                        }
                    }
                }
                exit_status = &mut exit_rx => {
                    self.status = exit_status.unwrap_or(ProcessStatus::Lost);
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(self.status);
                    }
                }
            }
        }
    }

    fn kill(&mut self) -> bool {
        match (self.status, self.kill_tx.take()) {
            (ProcessStatus::Running, Some(kill_tx)) => kill_tx.send(()).is_ok(),
            _ => false,
        }
    }
}

/// Wait for the child to exit, killing it if asked to.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ProcessStatus>,
) {
    let mut kill_rx = kill_rx.fuse();
    let status = loop {
        select! {
            _ = &mut kill_rx => {
                debug!(pid = ?child.id(), "killing child process");
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill child process");
                }
            }
            exit_status = child.wait() => {
                break match exit_status {
                    Ok(exit_status) => status_of(exit_status),
                    Err(err) => {
                        warn!(%err, "failed to collect child exit status");
                        ProcessStatus::Lost
                    }
                };
            }
        }
    };
    let _ = exit_tx.send(status);
}

fn status_of(exit_status: ExitStatus) -> ProcessStatus {
    if let Some(code) = exit_status.code() {
        ProcessStatus::Exited { code }
    } else if let Some(signal) = exit_status.signal() {
        ProcessStatus::Killed { signal }
    } else {
        ProcessStatus::Lost
    }
}

async fn pipe_output<R>(
    mut reader: R,
    output_tx: mpsc::UnboundedSender<Output>,
    wrap: fn(OutputBlob) -> Output,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(n) if n > 0 => {
                // move the bytes out of buf and into a message
                if output_tx.send(wrap(buf.split().freeze())).is_err() {
                    break;
                }
            }
            _ => break,
        }
    }
}
