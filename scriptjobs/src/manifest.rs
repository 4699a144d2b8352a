use crate::error::{Error, Result};
use crate::fs::write_atomic;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::debug;

/// The set of third-party packages that have been installed successfully.
///
/// Persisted as a requirements file with one package name per line, sorted and
/// without duplicates. Every change rewrites the whole file atomically.
///
/// An existing file is taken at its word: every name in it counts as installed, including
/// names an older append-only file may have listed before their install was attempted.
/// Deleting the file forces a clean reinstall on the next submission.
#[derive(Debug)]
pub struct Manifest {
    path: Option<PathBuf>,
    names: Mutex<BTreeSet<String>>,
}

impl Manifest {
    /// Load the manifest at `path`. A missing file is an empty manifest.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let names = match fs::read_to_string(&path).await {
            Ok(text) => parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(Error::io(&path, e)),
        };
        debug!(path = %path.display(), packages = names.len(), "loaded manifest");
        Ok(Self {
            path: Some(path),
            names: Mutex::new(names),
        })
    }

    /// A manifest that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            names: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn names(&self) -> Vec<String> {
        self.names.lock().await.iter().cloned().collect()
    }

    /// The subset of `packages` not yet in the manifest.
    pub async fn missing(&self, packages: &BTreeSet<String>) -> BTreeSet<String> {
        let names = self.names.lock().await;
        packages.difference(&names).cloned().collect()
    }

    /// Add `packages` and persist. The file is left untouched if nothing new was added.
    pub async fn record(&self, packages: &BTreeSet<String>) -> Result<()> {
        let mut names = self.names.lock().await;
        let before = names.len();
        names.extend(packages.iter().cloned());
        if names.len() == before {
            return Ok(());
        }
        if let Some(path) = &self.path {
            let mut text = String::new();
            for name in names.iter() {
                text.push_str(name);
                text.push('\n');
            }
            write_atomic(path, text.as_bytes()).await?;
        }
        Ok(())
    }
}

fn parse(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
