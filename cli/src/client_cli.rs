use anyhow::Context;
use scriptjobs::{Config, HistoryEntry, JobManager, JobName};
use std::future;
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Drives a [`JobManager`] for one command-line invocation and prints what it records.
pub struct ClientCli {
    manager: JobManager,
}

impl ClientCli {
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let manager = JobManager::open(config)
            .await
            .context("failed to load job state")?;
        Ok(Self { manager })
    }

    pub async fn submit_job(&self, file: &Path, name: Option<&str>, run: bool) -> anyhow::Result<()> {
        let name = match name {
            Some(name) => name.to_string(),
            None => JobName::from_upload(file)?.to_string(),
        };
        let script = fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let entry = self.manager.submit(&name, &script).await?;
        print_entry(&entry);
        if run && entry.is_success() {
            self.run_job(&name).await?;
        }
        Ok(())
    }

    pub async fn run_job(&self, name: &str) -> anyhow::Result<()> {
        let entry = self.manager.run_until(name, ctrl_c()).await?;
        print_entry(&entry);
        Ok(())
    }

    pub async fn delete_job(&self, name: &str) -> anyhow::Result<()> {
        self.manager.delete(name).await?;
        println!("Deleted job: {}", name);
        Ok(())
    }

    pub async fn list_history(&self) {
        let entries = self.manager.list().await;
        if entries.is_empty() {
            println!("No history yet.");
        }
        for entry in &entries {
            print_entry(entry);
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler can't be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "cannot listen for Ctrl-C");
        future::pending::<()>().await;
    }
}

fn print_entry(entry: &HistoryEntry) {
    println!("{}  {}", entry.job_name, entry.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("Output:");
    print_block(&entry.output);
    if !entry.error.is_empty() {
        println!("Errors:");
        print_block(&entry.error);
    }
    println!();
}

fn print_block(text: &str) {
    for line in text.lines() {
        println!("    {}", line);
    }
}
