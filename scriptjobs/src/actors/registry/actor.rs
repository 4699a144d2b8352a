use super::messages::RegistryMessage;
use super::{ProcessHandle, StartOutcome};
use crate::actors::{broadcaster::BroadcasterHandle, worker::WorkerHandle};
use crate::error::{self, Error};
use crate::types::{Command, JobName, RunId};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct ProcessRegistryActor {
    inbox: mpsc::Receiver<RegistryMessage>,
    handles: HashMap<JobName, ProcessHandle>,
}

impl ProcessRegistryActor {
    pub fn spawn(inbox: mpsc::Receiver<RegistryMessage>) {
        let actor = Self {
            inbox,
            handles: HashMap::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::RegistryMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Start {
                    job_name,
                    command,
                    response,
                } => {
                    let _ = response.send(self.start(job_name, command).await);
                }
                Stop { job_name, response } => {
                    self.reap_exited().await;
                    let _ = response.send(self.stop(&job_name).await);
                }
                Get { job_name, response } => {
                    self.reap_exited().await;
                    let _ = response.send(self.handles.get(&job_name).cloned());
                }
                Release {
                    job_name,
                    run_id,
                    response,
                } => {
                    let _ = response.send(self.release(&job_name, run_id));
                }
            }
        }
        // registry dropped: stop everything still registered
        for (_, handle) in self.handles.drain() {
            handle.kill().await;
        }
    }

    async fn start(&mut self, job_name: JobName, command: Command) -> error::Result<StartOutcome> {
        self.reap_exited().await;
        if let Some(existing) = self.handles.get(&job_name).cloned() {
            debug!(job = %job_name, run_id = %existing.run_id(), "job is busy");
            return Ok(StartOutcome::Busy(existing));
        }

        let (output_tx, output_rx) = mpsc::unbounded_channel(); // channel for piping child process output
        let worker = WorkerHandle::spawn(output_tx, &command).map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let output = BroadcasterHandle::spawn(output_rx);
        let handle = ProcessHandle {
            job_name: job_name.clone(),
            run_id: uuid::Uuid::new_v4(),
            worker,
            output,
        };
        info!(job = %job_name, run_id = %handle.run_id, program = %command.program, "started process");
        self.handles.insert(job_name, handle.clone());
        Ok(StartOutcome::Started(handle))
    }

    async fn stop(&mut self, job_name: &JobName) -> bool {
        match self.handles.remove(job_name) {
            Some(handle) => {
                let killed = handle.kill().await;
                info!(job = %job_name, run_id = %handle.run_id, killed, "stopped process");
                true
            }
            None => false,
        }
    }

    /// Forget every process that has exited on its own, e.g. a timed-out run that finished later.
    async fn reap_exited(&mut self) {
        let mut exited = Vec::new();
        for (job_name, handle) in &self.handles {
            if !handle.status().await.is_running() {
                exited.push(job_name.clone());
            }
        }
        for job_name in exited {
            if let Some(handle) = self.handles.remove(&job_name) {
                debug!(job = %job_name, run_id = %handle.run_id, "reaping exited process");
            }
        }
    }

    fn release(&mut self, job_name: &JobName, run_id: RunId) -> bool {
        match self.handles.get(job_name) {
            Some(handle) if handle.run_id == run_id => {
                self.handles.remove(job_name);
                debug!(job = %job_name, %run_id, "released process");
                true
            }
            _ => false,
        }
    }
}
