mod actor;
mod messages;

use self::{actor::ProcessRegistryActor, messages::RegistryMessage};
use crate::actors::{
    broadcaster::{BroadcasterHandle, Stream},
    worker::WorkerHandle,
};
use crate::error::{self, Error};
use crate::events::ProcessStatus;
use crate::types::{Command, JobName, OutputBlob, RunId};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

const DEFAULT_MESSAGE_CAPACITY: usize = 64;

/// A live subordinate process registered under a job name.
///
/// Handles are cheap to clone; the process is killed once the registry has let go of it
/// and every clone has been dropped.
#[derive(Clone)]
pub struct ProcessHandle {
    job_name: JobName,
    run_id: RunId,
    worker: WorkerHandle,
    output: BroadcasterHandle,
}

impl ProcessHandle {
    pub fn job_name(&self) -> &JobName {
        &self.job_name
    }

    /// Unique id of this particular process, distinguishing it from earlier runs of the same job.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn status(&self) -> ProcessStatus {
        self.worker.status().await
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> ProcessStatus {
        self.worker.wait().await
    }

    /// Kill the process without touching the registry.
    pub async fn kill(&self) -> bool {
        self.worker.stop().await
    }

    /// Everything the process wrote to stdout, from the start, until it closes the pipe.
    pub fn stdout(&self) -> mpsc::UnboundedReceiver<OutputBlob> {
        self.output.subscribe(Stream::Stdout)
    }

    pub fn stderr(&self) -> mpsc::UnboundedReceiver<OutputBlob> {
        self.output.subscribe(Stream::Stderr)
    }

    pub fn all_output(&self) -> mpsc::UnboundedReceiver<OutputBlob> {
        self.output.subscribe(Stream::All)
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("job_name", &self.job_name)
            .field("run_id", &self.run_id)
            .finish()
    }
}

/// Result of asking the registry to start a job's process.
#[derive(Debug)]
pub enum StartOutcome {
    Started(ProcessHandle),
    /// A process for the job is still running. Nothing was spawned; the caller decides
    /// whether to stop the existing one and retry, or give up.
    Busy(ProcessHandle),
}

/// Tracks at most one live subordinate process per job name.
///
/// This struct is an actor handle. The map of processes is owned by the actor spawned in
/// `ProcessRegistry::spawn`, which serializes every read-modify-write on it, so the handle
/// can be cloned freely across tasks without an `Arc<Mutex>`.
#[derive(Clone)]
pub struct ProcessRegistry {
    sender: mpsc::Sender<RegistryMessage>,
}

impl ProcessRegistry {
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_MESSAGE_CAPACITY)
    }

    /// Spawn a new registry.
    ///
    /// Specify the capacity for the registry's message queue. This limits the build-up of inbound messages.
    pub fn with_capacity(message_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(message_capacity);
        ProcessRegistryActor::spawn(receiver);
        Self { sender }
    }

    /// Spawn `command` and register it under `job_name`. Returns without waiting for the process.
    pub async fn start(&self, job_name: JobName, command: Command) -> error::Result<StartOutcome> {
        self.request(|response| RegistryMessage::Start {
            job_name,
            command,
            response,
        })
        .await?
    }

    /// Kill and unregister the job's process. Returns false if nothing was registered.
    pub async fn stop(&self, job_name: &JobName) -> error::Result<bool> {
        let job_name = job_name.clone();
        self.request(|response| RegistryMessage::Stop { job_name, response })
            .await
    }

    pub async fn get(&self, job_name: &JobName) -> error::Result<Option<ProcessHandle>> {
        let job_name = job_name.clone();
        self.request(|response| RegistryMessage::Get { job_name, response })
            .await
    }

    /// Unregister the job's process, but only if it is still the run identified by `run_id`.
    pub async fn release(&self, job_name: &JobName, run_id: RunId) -> error::Result<bool> {
        let job_name = job_name.clone();
        self.request(|response| RegistryMessage::Release {
            job_name,
            run_id,
            response,
        })
        .await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> error::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::RegistryClosed)?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> JobName {
        JobName::new(name).unwrap()
    }

    fn sleep(secs: &str) -> Command {
        Command::new("sleep").arg(secs)
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<OutputBlob>) -> String {
        let mut out = Vec::new();
        while let Some(blob) = rx.recv().await {
            out.extend_from_slice(&blob);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let registry = ProcessRegistry::spawn();
        let command = Command::new("sh")
            .arg("-c")
            .arg("printf 'hello world!'; printf oops >&2; exit 3");
        let handle = match registry.start(job("echo"), command).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        assert_eq!(collect(handle.stdout()).await, "hello world!");
        assert_eq!(collect(handle.stderr()).await, "oops");
        assert_eq!(handle.wait().await, ProcessStatus::Exited { code: 3 });
    }

    #[tokio::test]
    async fn second_start_for_running_job_is_busy() {
        let registry = ProcessRegistry::spawn();
        let first = match registry.start(job("slow"), sleep("30")).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        match registry.start(job("slow"), sleep("30")).await.unwrap() {
            StartOutcome::Busy(existing) => assert_eq!(existing.run_id(), first.run_id()),
            StartOutcome::Started(_) => panic!("second process spawned for a busy job"),
        }
        assert!(registry.stop(&job("slow")).await.unwrap());
    }

    #[tokio::test]
    async fn exited_process_is_replaced() {
        let registry = ProcessRegistry::spawn();
        let first = match registry.start(job("quick"), Command::new("true")).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        first.wait().await;
        match registry.start(job("quick"), Command::new("true")).await.unwrap() {
            StartOutcome::Started(second) => assert_ne!(second.run_id(), first.run_id()),
            StartOutcome::Busy(_) => panic!("exited process still counted as busy"),
        }
    }

    #[tokio::test]
    async fn exited_processes_are_forgotten() {
        let registry = ProcessRegistry::spawn();
        let mut finished = Vec::new();
        for name in ["a", "b", "c"] {
            match registry.start(job(name), Command::new("true")).await.unwrap() {
                StartOutcome::Started(handle) => finished.push(handle),
                StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
            }
        }
        let running = match registry.start(job("slow"), sleep("30")).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        for handle in &finished {
            handle.wait().await;
        }

        // a lookup of any name sweeps every exited entry
        assert!(registry.get(&job("slow")).await.unwrap().is_some());
        for handle in &finished {
            assert!(!registry.release(handle.job_name(), handle.run_id()).await.unwrap());
        }
        assert!(registry.stop(&job("slow")).await.unwrap());
        running.wait().await;
    }

    #[tokio::test]
    async fn stop_kills_and_unregisters() {
        let registry = ProcessRegistry::spawn();
        let handle = match registry.start(job("slow"), sleep("30")).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        assert!(registry.stop(&job("slow")).await.unwrap());
        assert!(matches!(handle.wait().await, ProcessStatus::Killed { .. }));
        assert!(registry.get(&job("slow")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_unknown_job_is_a_noop() {
        let registry = ProcessRegistry::spawn();
        assert!(!registry.stop(&job("nobody")).await.unwrap());
    }

    #[tokio::test]
    async fn release_only_matches_current_run() {
        let registry = ProcessRegistry::spawn();
        let handle = match registry.start(job("slow"), sleep("30")).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            StartOutcome::Busy(_) => panic!("fresh registry reported busy"),
        };
        assert!(!registry.release(&job("slow"), uuid::Uuid::new_v4()).await.unwrap());
        assert!(registry.get(&job("slow")).await.unwrap().is_some());
        assert!(registry.release(&job("slow"), handle.run_id()).await.unwrap());
        assert!(registry.get(&job("slow")).await.unwrap().is_none());
        handle.kill().await;
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let registry = ProcessRegistry::spawn();
        let result = registry
            .start(job("ghost"), Command::new("/definitely/not/a/program"))
            .await;
        assert!(matches!(result, Err(Error::Spawn { .. })));
        assert!(registry.get(&job("ghost")).await.unwrap().is_none());
    }
}
