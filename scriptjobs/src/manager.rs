//! The job lifecycle façade: submit, run, stop, delete and list.
//!
//! Scripts are executed with the host's full privileges. Whoever can call into a
//! [`JobManager`] is trusted to run arbitrary code on this machine.

use crate::actors::registry::ProcessRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::JobExecutor;
use crate::fs::write_atomic;
use crate::history::{HistoryEntry, HistoryStore};
use crate::installer::{DependencyInstaller, PipInstaller};
use crate::manifest::Manifest;
use crate::types::JobName;
use std::collections::HashMap;
use std::future::{self, Future};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tracing::{info, warn};

/// Owns the scripts directory, the executor (and through it the process registry) and the
/// history. Clones share the same state and can be used from any number of tasks.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    scripts_dir: PathBuf,
    executor: JobExecutor,
    history: HistoryStore,
    /// How many times each job has been deleted. A submit or run only records its entry if
    /// this hasn't moved since it began.
    deletions: Mutex<HashMap<JobName, u64>>,
}

impl JobManager {
    pub fn new(scripts_dir: impl Into<PathBuf>, executor: JobExecutor, history: HistoryStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                scripts_dir: scripts_dir.into(),
                executor,
                history,
                deletions: Mutex::default(),
            }),
        }
    }

    /// Load persisted state described by `config` and spawn the process registry.
    pub async fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.scripts_dir)
            .await
            .map_err(|e| Error::io(&config.scripts_dir, e))?;
        let history = HistoryStore::load(&config.history_path).await?;
        let manifest = Manifest::load(&config.manifest_path).await?;
        let installer = DependencyInstaller::new(manifest, Arc::new(PipInstaller::new(&config.python)));
        let executor = JobExecutor::new(
            ProcessRegistry::spawn(),
            installer,
            &config.python,
            config.run_timeout,
        );
        info!(scripts_dir = %config.scripts_dir.display(), "job manager ready");
        Ok(Self::new(&config.scripts_dir, executor, history))
    }

    pub fn registry(&self) -> &ProcessRegistry {
        self.inner.executor.registry()
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.inner.scripts_dir
    }

    pub fn script_path(&self, job_name: &JobName) -> PathBuf {
        self.inner.scripts_dir.join(job_name.as_str())
    }

    /// Store `script` under `name`, replacing any earlier upload, then install what it imports.
    pub async fn submit(&self, name: &str, script: &[u8]) -> Result<HistoryEntry> {
        let job_name = JobName::new(name)?;
        let generation = self.deletions(&job_name);
        let path = self.script_path(&job_name);
        write_atomic(&path, script).await?;
        info!(job = %job_name, bytes = script.len(), "script submitted");

        let entry = self.inner.executor.submit_and_run(&job_name, &path).await;
        self.record(&job_name, generation, entry).await
    }

    /// Execute a submitted script and record what it printed.
    pub async fn run(&self, name: &str) -> Result<HistoryEntry> {
        self.run_until(name, future::pending()).await
    }

    /// Like [`run`](Self::run), but stops the script early once `cancel` resolves.
    pub async fn run_until<F>(&self, name: &str, cancel: F) -> Result<HistoryEntry>
    where
        F: Future<Output = ()>,
    {
        let job_name = JobName::new(name)?;
        let generation = self.deletions(&job_name);
        let path = self.script_path(&job_name);
        if fs::metadata(&path).await.is_err() {
            return Err(Error::NotFound(job_name));
        }

        let entry = self
            .inner
            .executor
            .rerun_until(&job_name, &path, cancel)
            .await;
        self.record(&job_name, generation, entry).await
    }

    /// Kill the job's process if one is registered. Unknown jobs are ignored.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let job_name = match JobName::new(name) {
            Ok(job_name) => job_name,
            Err(_) => return Ok(()),
        };
        self.registry().stop(&job_name).await?;
        Ok(())
    }

    /// Stop the job, remove its script and purge its history. Unknown jobs are ignored.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let job_name = match JobName::new(name) {
            Ok(job_name) => job_name,
            Err(_) => return Ok(()),
        };
        *self
            .inner
            .deletions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_name.clone())
            .or_default() += 1;
        if let Err(err) = self.registry().stop(&job_name).await {
            warn!(job = %job_name, %err, "could not stop job before deleting it");
        }

        let path = self.script_path(&job_name);
        match fs::remove_file(&path).await {
            Ok(()) => info!(job = %job_name, "script deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&path, e)),
        }
        self.inner.history.remove_all(&job_name).await?;
        Ok(())
    }

    /// Every recorded submit and run, most recent first.
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.inner.history.entries().await
    }

    fn deletions(&self, job_name: &JobName) -> u64 {
        self.inner
            .deletions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_name)
            .copied()
            .unwrap_or(0)
    }

    /// Prepend `entry` unless the job was deleted after `generation` was read. A discarded
    /// entry is still returned to the caller.
    async fn record(&self, job_name: &JobName, generation: u64, entry: HistoryEntry) -> Result<HistoryEntry> {
        let recorded = self
            .inner
            .history
            .prepend_if(entry.clone(), || self.deletions(job_name) == generation)
            .await?;
        match recorded {
            Some(entry) => Ok(entry),
            None => {
                info!(job = %job_name, "job was deleted while in flight, not recording it");
                Ok(entry)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::{tests::FakeInstaller, NOTHING_TO_DO};
    use std::time::Duration;
    use tempfile::TempDir;

    /// A manager rooted in a temp dir that runs scripts with `sh`.
    async fn open_in(dir: &TempDir, timeout: Duration) -> JobManager {
        let config = Config {
            python: "sh".to_string(),
            run_timeout: timeout,
            ..Config::in_dir(dir.path())
        };
        JobManager::open(&config).await.unwrap()
    }

    fn with_installer(dir: &TempDir, installer: Arc<FakeInstaller>) -> JobManager {
        let executor = JobExecutor::new(
            ProcessRegistry::spawn(),
            DependencyInstaller::new(Manifest::in_memory(), installer),
            "sh",
            Duration::from_secs(5),
        );
        JobManager::new(dir.path(), executor, HistoryStore::in_memory())
    }

    fn job(name: &str) -> JobName {
        JobName::new(name).unwrap()
    }

    #[tokio::test]
    async fn submit_script_without_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;

        let entry = manager.submit("hello.py", b"print(\"hi\")\n").await.unwrap();
        assert_eq!(entry.output, NOTHING_TO_DO);
        assert_eq!(entry.error, "");
        assert_eq!(manager.list().await, vec![entry]);
    }

    #[tokio::test]
    async fn builtin_imports_never_reach_the_installer() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeInstaller::default());
        let manager = with_installer(&dir, fake.clone());

        let entry = manager
            .submit("tools.py", b"import os\nimport sys\nfrom json import dumps\n")
            .await
            .unwrap();
        assert_eq!(entry.output, NOTHING_TO_DO);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_install_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let manager = with_installer(&dir, Arc::new(FakeInstaller::failing()));
        let marker = dir.path().join("executed");
        let script = format!("import nonexistent_pkg_xyz\ntouch {}\n", marker.display());

        let entry = manager.submit("bad.py", script.as_bytes()).await.unwrap();
        assert_eq!(entry.output, "");
        assert!(entry.error.starts_with("pip install failed"), "{}", entry.error);
        assert_eq!(manager.list().await[0], entry);
        assert!(!marker.exists(), "script was executed");
    }

    #[tokio::test]
    async fn run_records_script_output() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.submit("greet.sh", b"echo hi\n").await.unwrap();

        let entry = manager.run("greet.sh").await.unwrap();
        assert_eq!(entry.output, "hi\n");
        assert_eq!(entry.error, "");
        assert_eq!(manager.list().await.len(), 2);
    }

    #[tokio::test]
    async fn resubmit_overwrites_script() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.submit("greet.sh", b"echo first\n").await.unwrap();
        manager.submit("greet.sh", b"echo second\n").await.unwrap();

        assert_eq!(manager.run("greet.sh").await.unwrap().output, "second\n");
    }

    #[tokio::test]
    async fn run_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        assert!(matches!(manager.run("nope.py").await, Err(Error::NotFound(_))));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_on_submit() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        assert!(matches!(
            manager.submit("../escape.py", b"echo hi\n").await,
            Err(Error::InvalidJobName(_))
        ));
    }

    #[tokio::test]
    async fn timed_out_run_can_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_millis(300)).await;
        manager.submit("slow.sh", b"exec sleep 30\n").await.unwrap();

        let entry = manager.run("slow.sh").await.unwrap();
        assert!(entry.error.contains("timed out"), "{}", entry.error);
        assert_eq!(manager.list().await[0], entry);
        assert!(manager.registry().get(&job("slow.sh")).await.unwrap().is_some());

        manager.stop("slow.sh").await.unwrap();
        assert!(manager.registry().get(&job("slow.sh")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_unknown_job_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.stop("nobody.py").await.unwrap();
        manager.stop("../weird").await.unwrap();
    }

    #[tokio::test]
    async fn delete_unknown_job_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.submit("keep.sh", b"echo keep\n").await.unwrap();
        let before = manager.list().await;

        manager.delete("ghost.py").await.unwrap();
        assert_eq!(manager.list().await, before);
        assert!(manager.script_path(&job("keep.sh")).exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_millis(300)).await;
        manager.submit("slow.sh", b"exec sleep 30\n").await.unwrap();
        manager.submit("other.sh", b"echo other\n").await.unwrap();
        manager.run("slow.sh").await.unwrap();

        manager.delete("slow.sh").await.unwrap();
        let once = manager.list().await;
        manager.delete("slow.sh").await.unwrap();

        assert_eq!(manager.list().await, once);
        assert!(once.iter().all(|entry| entry.job_name == "other.sh"));
        assert!(!manager.script_path(&job("slow.sh")).exists());
        assert!(manager.registry().get(&job("slow.sh")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_during_run_leaves_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(10)).await;
        manager.submit("slow.sh", b"exec sleep 30\n").await.unwrap();

        let run = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run("slow.sh").await.unwrap() }
        });
        while manager.registry().get(&job("slow.sh")).await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.delete("slow.sh").await.unwrap();

        let entry = run.await.unwrap();
        assert!(entry.error.contains("signal"), "{}", entry.error);
        assert!(manager.list().await.is_empty());
        assert!(!manager.script_path(&job("slow.sh")).exists());
        let reopened = open_in(&dir, Duration::from_secs(5)).await;
        assert!(reopened.list().await.is_empty());
    }

    #[tokio::test]
    async fn job_can_be_resubmitted_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.submit("greet.sh", b"echo old\n").await.unwrap();
        manager.delete("greet.sh").await.unwrap();

        manager.submit("greet.sh", b"echo new\n").await.unwrap();
        let entry = manager.run("greet.sh").await.unwrap();
        assert_eq!(entry.output, "new\n");
        assert_eq!(manager.list().await.len(), 2);
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;
        manager.submit("a.sh", b"echo a\n").await.unwrap();
        manager.submit("b.sh", b"echo b\n").await.unwrap();
        manager.run("a.sh").await.unwrap();
        manager.run("b.sh").await.unwrap();

        let entries = manager.list().await;
        let events: Vec<_> = entries
            .iter()
            .map(|entry| (entry.job_name.as_str(), entry.output.as_str()))
            .collect();
        assert_eq!(
            events,
            [
                ("b.sh", "b\n"),
                ("a.sh", "a\n"),
                ("b.sh", NOTHING_TO_DO),
                ("a.sh", NOTHING_TO_DO),
            ]
        );
        assert!(entries.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = open_in(&dir, Duration::from_secs(5)).await;
        first.submit("a.sh", b"echo a\n").await.unwrap();
        first.run("a.sh").await.unwrap();
        let before = first.list().await;

        let reopened = open_in(&dir, Duration::from_secs(5)).await;
        assert_eq!(reopened.list().await, before);
        assert_eq!(reopened.run("a.sh").await.unwrap().output, "a\n");
    }

    #[tokio::test]
    async fn concurrent_submissions_are_all_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir, Duration::from_secs(5)).await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .submit(&format!("job{i}.sh"), b"echo hi\n")
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(manager.list().await.len(), 8);
        let reopened = open_in(&dir, Duration::from_secs(5)).await;
        assert_eq!(reopened.list().await.len(), 8);
    }
}
