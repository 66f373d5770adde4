//! Scoped temporary storage
//!
//! A [`ResourceGuard`] owns every temporary resource a job acquires and
//! releases each one exactly once, on success, on error and on panic.
//! Release failures are logged and returned as [`CleanupWarning`]s; they
//! never change the job's result.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir, TempPath};
use tracing::{debug, warn};

use crate::error::{CleanupWarning, Result};

const SPOOL_PREFIX: &str = "pdftools-";
const SPOOL_SUFFIX: &str = ".pdf";

/// Something that must be released when a job finishes.
pub trait TempResource: Send {
    /// Short description used in logs and warnings.
    fn describe(&self) -> String;

    fn release(self: Box<Self>) -> io::Result<()>;
}

impl TempResource for TempPath {
    fn describe(&self) -> String {
        self.display().to_string()
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        (*self).close()
    }
}

impl TempResource for TempDir {
    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        (*self).close()
    }
}

#[derive(Default)]
pub struct ResourceGuard {
    resources: Vec<Box<dyn TempResource>>,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<R: TempResource + 'static>(&mut self, resource: R) {
        debug!(resource = %resource.describe(), "Tracking temporary resource");
        self.resources.push(Box::new(resource));
    }

    /// Write `bytes` to a new temporary file (in `dir`, or the system temp
    /// directory) that this guard will delete.
    pub fn spool(&mut self, dir: Option<&Path>, bytes: &[u8]) -> Result<PathBuf> {
        let mut file = spool_builder(dir)?;

        // Tracked even when the write fails.
        let result = file.write_all(bytes).and_then(|_| file.flush());
        let path = file.into_temp_path();
        let location = path.to_path_buf();
        self.track(path);
        result?;

        Ok(location)
    }

    /// Create an empty tracked temporary file for streaming writes.
    pub fn spool_file(&mut self, dir: Option<&Path>) -> Result<(File, PathBuf)> {
        let file = spool_builder(dir)?;
        let (handle, path) = file.into_parts();
        let location = path.to_path_buf();
        self.track(path);
        Ok((handle, location))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything tracked so far. Safe to call more than once.
    pub fn release_all(&mut self) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();

        for resource in self.resources.drain(..) {
            let name = resource.describe();
            if let Err(err) = resource.release() {
                let warning = CleanupWarning {
                    resource: name,
                    detail: err.to_string(),
                };
                warn!(%warning, "Cleanup failed");
                warnings.push(warning);
            }
        }

        warnings
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.resources.iter().map(|r| r.describe()).collect();
        f.debug_struct("ResourceGuard")
            .field("resources", &names)
            .finish()
    }
}

fn spool_builder(dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(SPOOL_PREFIX).suffix(SPOOL_SUFFIX);
    match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Run `body` with a fresh guard and release its resources afterwards,
/// whatever `body` returned.
pub fn with_guard<T, F>(body: F) -> Result<T>
where
    F: FnOnce(&mut ResourceGuard) -> Result<T>,
{
    let mut guard = ResourceGuard::new();
    let result = body(&mut guard);
    guard.release_all();
    result
}
