//! Installation of the packages a script needs, through the host's package manager.

use crate::manifest::Manifest;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

pub const NOTHING_TO_DO: &str = "No new requirements needed.";

/// What came of an install request. Failures are values, never errors: the installer's
/// output is always shown as the result of a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Every package was already installed; the package manager was not invoked.
    NothingToDo,
    Installed {
        log: String,
    },
    Failed {
        log: String,
        diagnostic: String,
    },
}

impl InstallOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, InstallOutcome::Failed { .. })
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::NothingToDo => f.write_str(NOTHING_TO_DO),
            InstallOutcome::Installed { log } => f.write_str(log),
            InstallOutcome::Failed { log, diagnostic } => {
                write!(f, "pip install failed: {diagnostic}")?;
                if !log.is_empty() {
                    write!(f, "\n{log}")?;
                }
                Ok(())
            }
        }
    }
}

/// A package manager able to install a non-empty list of packages.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, packages: &[String]) -> InstallOutcome;
}

/// Installs packages with `<python> -m pip install ...`.
#[derive(Clone, Debug)]
pub struct PipInstaller {
    python: String,
}

impl PipInstaller {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl PackageInstaller for PipInstaller {
    async fn install(&self, packages: &[String]) -> InstallOutcome {
        let result = Command::new(&self.python)
            .args(["-m", "pip", "install"])
            .args(packages)
            .kill_on_drop(true)
            .output()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                return InstallOutcome::Failed {
                    log: String::new(),
                    diagnostic: format!("failed to launch {}: {err}", self.python),
                }
            }
        };

        // stdout first, then stderr; nothing is dropped
        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            InstallOutcome::Installed { log }
        } else {
            InstallOutcome::Failed {
                log,
                diagnostic: format!("{} -m pip install exited with {}", self.python, output.status),
            }
        }
    }
}

/// Installs a job's imports that the manifest does not already list, recording them in
/// the manifest once the package manager succeeds.
pub struct DependencyInstaller {
    manifest: Manifest,
    installer: Arc<dyn PackageInstaller>,
}

impl DependencyInstaller {
    pub fn new(manifest: Manifest, installer: Arc<dyn PackageInstaller>) -> Self {
        Self {
            manifest,
            installer,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub async fn install(&self, packages: &BTreeSet<String>) -> InstallOutcome {
        let missing = self.manifest.missing(packages).await;
        if missing.is_empty() {
            return InstallOutcome::NothingToDo;
        }

        let names: Vec<String> = missing.iter().cloned().collect();
        info!(packages = ?names, "installing requirements");
        let outcome = self.installer.install(&names).await;
        match &outcome {
            InstallOutcome::Installed { .. } => {
                if let Err(err) = self.manifest.record(&missing).await {
                    // the packages are installed; the next submission just reinstalls them
                    warn!(%err, "failed to update manifest");
                }
            }
            InstallOutcome::Failed { diagnostic, .. } => {
                warn!(packages = ?names, %diagnostic, "requirements install failed");
            }
            InstallOutcome::NothingToDo => {}
        }
        outcome
    }
}
