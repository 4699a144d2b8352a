//! Install-then-record for new submissions, run-and-capture for re-runs.
//!
//! Every failure past this point (install failure, missing interpreter, busy job,
//! timeout, cancellation) becomes the error text of a [`HistoryEntry`].

use crate::actors::registry::{ProcessHandle, ProcessRegistry, StartOutcome};
use crate::error;
use crate::events::ProcessStatus;
use crate::history::HistoryEntry;
use crate::installer::{DependencyInstaller, InstallOutcome};
use crate::scanner;
use crate::types::{Command, JobName, OutputBlob};
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, select};
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("script {} does not exist", .0.display())]
    MissingScript(PathBuf),
    #[error("job '{0}' is already running")]
    Busy(JobName),
    #[error(transparent)]
    Registry(#[from] error::Error),
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(ProcessStatus),
    /// The deadline passed. The process is still registered and must be stopped explicitly.
    TimedOut(Duration),
    /// The caller gave up; the process was killed and unregistered.
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub outcome: RunOutcome,
}

impl RunResult {
    pub fn into_entry(self, job_name: &JobName) -> HistoryEntry {
        let RunResult {
            stdout,
            mut stderr,
            outcome,
        } = self;
        match outcome {
            RunOutcome::Finished(ProcessStatus::Exited { .. } | ProcessStatus::Running) => {}
            RunOutcome::Finished(ProcessStatus::Killed { signal }) => {
                append_line(&mut stderr, &format!("Execution stopped by signal {signal}"))
            }
            RunOutcome::Finished(ProcessStatus::Lost) => {
                append_line(&mut stderr, "Execution ended with an unknown exit status")
            }
            RunOutcome::TimedOut(timeout) => {
                append_line(&mut stderr, &format!("Execution timed out after {timeout:?}"))
            }
            RunOutcome::Cancelled => append_line(&mut stderr, "Execution cancelled"),
        }
        HistoryEntry::now(job_name, stdout, stderr)
    }
}

fn append_line(text: &mut String, line: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
}

/// Stops one particular run of a job, leaving any later run of the same job alone.
#[derive(Clone)]
pub struct CancelHandle {
    registry: ProcessRegistry,
    handle: ProcessHandle,
}

impl CancelHandle {
    pub async fn cancel(&self) -> bool {
        let killed = self.handle.kill().await;
        let _ = self
            .registry
            .release(self.handle.job_name(), self.handle.run_id())
            .await;
        killed
    }
}

/// A launched script whose completion has not been collected yet.
///
/// Dropping it does not kill the process: it stays in the registry, where `stop` can reach it.
pub struct RunningJob {
    registry: ProcessRegistry,
    handle: ProcessHandle,
}

impl RunningJob {
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            registry: self.registry.clone(),
            handle: self.handle.clone(),
        }
    }

    /// Collect the process's output until it exits, `timeout` passes, or `cancel` resolves.
    pub async fn wait<F>(self, timeout: Duration, cancel: F) -> RunResult
    where
        F: Future<Output = ()>,
    {
        let mut stdout_rx = self.handle.stdout();
        let mut stderr_rx = self.handle.stderr();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (mut stdout_open, mut stderr_open) = (true, true);
        let mut status = None;

        let exit = self.handle.wait();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(exit, deadline, cancel);

        let outcome = loop {
            if let (false, false, Some(status)) = (stdout_open, stderr_open, status) {
                break RunOutcome::Finished(status);
            }
            select! {
                chunk = stdout_rx.recv(), if stdout_open => {
                    stdout_open = extend(&mut stdout, chunk);
                }
                chunk = stderr_rx.recv(), if stderr_open => {
                    stderr_open = extend(&mut stderr, chunk);
                }
                exit_status = &mut exit, if status.is_none() => {
                    status = Some(exit_status);
                }
                _ = &mut deadline => break RunOutcome::TimedOut(timeout),
                _ = &mut cancel => break RunOutcome::Cancelled,
            }
        };

        let job_name = self.handle.job_name();
        match outcome {
            RunOutcome::Finished(status) => {
                debug!(job = %job_name, ?status, "run finished");
                let _ = self.registry.release(job_name, self.handle.run_id()).await;
            }
            RunOutcome::TimedOut(_) => {
                warn!(job = %job_name, ?timeout, "run timed out, leaving process registered");
            }
            RunOutcome::Cancelled => {
                info!(job = %job_name, "run cancelled");
                self.cancel_handle().cancel().await;
            }
        }

        RunResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            outcome,
        }
    }
}

/// Append a chunk to `buf`. Returns false once the stream has ended.
fn extend(buf: &mut Vec<u8>, chunk: Option<OutputBlob>) -> bool {
    match chunk {
        Some(blob) => {
            buf.extend_from_slice(&blob);
            true
        }
        None => false,
    }
}

pub struct JobExecutor {
    registry: ProcessRegistry,
    installer: DependencyInstaller,
    python: String,
    timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        registry: ProcessRegistry,
        installer: DependencyInstaller,
        python: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            installer,
            python: python.into(),
            timeout,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn installer(&self) -> &DependencyInstaller {
        &self.installer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scan a freshly submitted script and install what it imports.
    ///
    /// The entry's output is the installer's log. If installation fails the output is
    /// empty, the error carries the diagnostic, and the script is not executed.
    pub async fn submit_and_run(&self, job_name: &JobName, script_path: &Path) -> HistoryEntry {
        let script = match fs::read_to_string(script_path).await {
            Ok(script) => script,
            Err(err) => {
                return HistoryEntry::now(
                    job_name,
                    "",
                    format!("Could not read script {}: {err}", script_path.display()),
                )
            }
        };
        let packages = scanner::scan(&script);
        debug!(job = %job_name, ?packages, "scanned imports");

        match self.installer.install(&packages).await {
            outcome @ InstallOutcome::Failed { .. } => {
                HistoryEntry::now(job_name, "", outcome.to_string())
            }
            outcome => HistoryEntry::now(job_name, outcome.to_string(), ""),
        }
    }

    /// Start the script under the registry without waiting for it.
    pub async fn launch(
        &self,
        job_name: &JobName,
        script_path: &Path,
    ) -> Result<RunningJob, LaunchError> {
        if fs::metadata(script_path).await.is_err() {
            return Err(LaunchError::MissingScript(script_path.to_path_buf()));
        }
        let command = Command::new(self.python.as_str()).arg(script_path.to_string_lossy());
        match self.registry.start(job_name.clone(), command).await? {
            StartOutcome::Started(handle) => Ok(RunningJob {
                registry: self.registry.clone(),
                handle,
            }),
            StartOutcome::Busy(_) => Err(LaunchError::Busy(job_name.clone())),
        }
    }

    /// Run an already installed script, waiting at most the configured timeout.
    pub async fn rerun(&self, job_name: &JobName, script_path: &Path) -> HistoryEntry {
        self.rerun_until(job_name, script_path, future::pending())
            .await
    }

    /// Like [`rerun`](Self::rerun), but gives up and stops the process once `cancel` resolves.
    pub async fn rerun_until<F>(&self, job_name: &JobName, script_path: &Path, cancel: F) -> HistoryEntry
    where
        F: Future<Output = ()>,
    {
        match self.launch(job_name, script_path).await {
            Ok(running) => running.wait(self.timeout, cancel).await.into_entry(job_name),
            Err(err) => {
                warn!(job = %job_name, %err, "failed to launch script");
                HistoryEntry::now(job_name, "", format!("Execution failed: {err}"))
            }
        }
    }
}
