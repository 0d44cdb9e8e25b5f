use glob::Pattern;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("No .{extension} artifact in {}", .dir.display())]
    NotFound { dir: PathBuf, extension: String },
    #[error("Invalid artifact pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Failed to inspect download directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of the download directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    /// A partial-download marker exists.
    InProgress,
    /// At least one artifact and no partial marker.
    Complete,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearSummary {
    pub removed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Watches one directory for a browser download to finish.
///
/// Files are matched by extension only. Completion is inferred from the
/// filesystem, which can race the browser's final rename by up to one poll.
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    dir: PathBuf,
    artifact_extension: String,
    partial_extension: String,
    poll_interval: Duration,
    newer_than: Option<SystemTime>,
}

impl DownloadWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            artifact_extension: "csv".to_string(),
            partial_extension: "crdownload".to_string(),
            poll_interval: Duration::from_millis(500),
            newer_than: None,
        }
    }

    pub fn artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = extension.into();
        self
    }

    pub fn partial_extension(mut self, extension: impl Into<String>) -> Self {
        self.partial_extension = extension.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Ignore artifacts last modified before `since`, such as leftovers of
    /// an earlier run whose publish step failed.
    pub fn only_newer_than(mut self, since: SystemTime) -> Self {
        self.newer_than = Some(since);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn matching(&self, extension: &str) -> Result<Vec<PathBuf>, DownloadError> {
        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&self.dir.to_string_lossy()),
            extension
        );
        Ok(glob::glob(&pattern)?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect())
    }

    fn artifacts(&self) -> Result<Vec<(SystemTime, PathBuf)>, DownloadError> {
        let mut artifacts = Vec::new();
        for path in self.matching(&self.artifact_extension)? {
            let modified = std::fs::metadata(&path)?.modified()?;
            if self.newer_than.is_none_or(|since| modified >= since) {
                artifacts.push((modified, path));
            }
        }
        Ok(artifacts)
    }

    pub fn state(&self) -> Result<DownloadState, DownloadError> {
        if !self.matching(&self.partial_extension)?.is_empty() {
            return Ok(DownloadState::InProgress);
        }
        if self.artifacts()?.is_empty() {
            Ok(DownloadState::Idle)
        } else {
            Ok(DownloadState::Complete)
        }
    }

    /// True as soon as the directory is [`DownloadState::Complete`]; false
    /// once `timeout` has elapsed without that.
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        info!(
            "Waiting up to {:?} for .{} download in {}",
            timeout,
            self.artifact_extension,
            self.dir.display()
        );
        loop {
            match self.state() {
                Ok(DownloadState::Complete) => {
                    info!("Download complete after {:?}", started.elapsed());
                    return true;
                }
                Ok(state) => debug!("Download state: {:?}", state),
                Err(e) => debug!("Download directory not readable yet: {}", e),
            }
            if started.elapsed() >= timeout {
                warn!("Download did not complete within {:?}", timeout);
                return false;
            }
            sleep(self.poll_interval).await;
        }
    }

    /// The most recently modified artifact.
    pub fn latest_artifact(&self) -> Result<PathBuf, DownloadError> {
        self.artifacts()?
            .into_iter()
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, path)| path)
            .ok_or_else(|| DownloadError::NotFound {
                dir: self.dir.clone(),
                extension: self.artifact_extension.clone(),
            })
    }

    /// Removes artifacts and stray partial markers. Keeps going past
    /// individual failures.
    pub fn clear(&self) -> Result<ClearSummary, DownloadError> {
        let mut summary = ClearSummary::default();
        let mut targets = self.matching(&self.artifact_extension)?;
        targets.extend(self.matching(&self.partial_extension)?);

        for path in targets {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    summary.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    summary.failed.push((path, e.to_string()));
                }
            }
        }
        info!(
            "Cleared download directory: {} removed, {} failed",
            summary.removed,
            summary.failed.len()
        );
        Ok(summary)
    }
}
