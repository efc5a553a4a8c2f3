//! Job registry: time-limited, one-time access to processed PDFs.
//!
//! A successful `process` request registers its PDF here and returns the job
//! id to the caller, who may download the PDF once within the TTL.
//!
//! ## Exactly-once deletion
//!
//! Two paths may end a job: [`JobRegistry::retrieve`] and
//! [`JobRegistry::sweep_expired`]. Both first *remove* the [`Job`] from the
//! map while holding the registry lock, and only the path that obtained the
//! owned `Job` value deletes its file, after the lock is released. The other
//! path finds the id absent and does nothing, so a file is never deleted
//! twice and never deleted while still reachable through the map.

use crate::artifact::PdfArtifact;
use crate::clock::{Clock, SystemClock};
use crate::error::Doc2TextError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque, random job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A registered PDF waiting to be downloaded.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub pdf_path: PathBuf,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

impl Job {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A job removed from the registry by [`JobRegistry::retrieve`].
///
/// The holder owns the PDF file. [`RetrievedJob::into_bytes`] reads and then
/// deletes it; dropping the value unread deletes it as well.
#[derive(Debug)]
pub struct RetrievedJob {
    id: JobId,
    display_name: String,
    path: Option<PathBuf>,
}

impl RetrievedJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the PDF and delete it, whether or not the read succeeded.
    pub async fn into_bytes(mut self) -> Result<Vec<u8>, Doc2TextError> {
        let Some(path) = self.path.take() else {
            return Err(Doc2TextError::JobNotFound(self.id.to_string()));
        };
        let read = tokio::fs::read(&path).await;
        delete_job_file(&path).await;
        read.map_err(|e| Doc2TextError::io(format!("reading job {}", self.id), e))
    }
}

impl Drop for RetrievedJob {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to delete unread job file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// In-memory map of live jobs plus the directory holding their PDFs.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Job>>,
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    /// Create a registry storing PDFs under `dir`, using wall-clock time.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, Doc2TextError> {
        Self::with_clock(dir, ttl, Arc::new(SystemClock))
    }

    /// Create a registry with an injected clock.
    pub fn with_clock(
        dir: impl Into<PathBuf>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Doc2TextError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Doc2TextError::io(format!("creating {}", dir.display()), e))?;
        let stale = remove_stale_pdfs(&dir);
        if stale > 0 {
            info!("Removed {} job file(s) left by a previous run in {}", stale, dir.display());
        }
        Ok(Self {
            jobs: Mutex::new(HashMap::new()),
            dir,
            ttl,
            clock,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take ownership of `pdf` and make it downloadable until the TTL ends.
    ///
    /// The file is moved into the registry directory; on error it is left
    /// where it was, still owned by the caller.
    pub async fn register(
        &self,
        pdf: &PdfArtifact,
        display_name: impl Into<String>,
    ) -> Result<Job, Doc2TextError> {
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| {
                Doc2TextError::InvalidConfig(format!("job TTL {:?} is out of range", self.ttl))
            })?;

        let id = JobId::new();
        let dest = self.dir.join(format!("{id}.pdf"));
        move_file(&pdf.path, &dest).await?;

        let job = Job {
            id,
            pdf_path: dest,
            display_name: display_name.into(),
            expires_at,
        };
        self.jobs.lock().await.insert(id, job.clone());
        info!("Registered job {} ({}), expires {}", id, job.display_name, job.expires_at);
        Ok(job)
    }

    /// Remove a job for download.
    ///
    /// Returns `None` for malformed, unknown, already retrieved or expired
    /// ids. An expired job found here is deleted on the spot.
    pub async fn retrieve(&self, id: &str) -> Option<RetrievedJob> {
        let id: JobId = id.parse().ok()?;
        let job = self.jobs.lock().await.remove(&id)?;

        if job.is_expired(self.clock.now()) {
            debug!("Job {} expired before download", id);
            delete_job_file(&job.pdf_path).await;
            return None;
        }

        debug!("Job {} retrieved", id);
        Some(RetrievedJob {
            id,
            display_name: job.display_name,
            path: Some(job.pdf_path),
        })
    }

    /// Delete every expired job; returns the ids that were removed.
    pub async fn sweep_expired(&self) -> Vec<JobId> {
        let now = self.clock.now();
        let expired: Vec<Job> = {
            let mut jobs = self.jobs.lock().await;
            let ids: Vec<JobId> = jobs
                .values()
                .filter(|job| job.is_expired(now))
                .map(|job| job.id)
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for job in &expired {
            delete_job_file(&job.pdf_path).await;
        }
        if !expired.is_empty() {
            info!("Swept {} expired job(s)", expired.len());
        }
        expired.into_iter().map(|job| job.id).collect()
    }

    /// Delete every job regardless of expiry (used on shutdown).
    pub async fn purge(&self) -> usize {
        let all: Vec<Job> = self.jobs.lock().await.drain().map(|(_, job)| job).collect();
        for job in &all {
            delete_job_file(&job.pdf_path).await;
        }
        all.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Run [`JobRegistry::sweep_expired`] every `period` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::spawn(async move {
            let mut ticks = IntervalStream::new(interval);
            while ticks.next().await.is_some() {
                registry.sweep_expired().await;
            }
        })
    }
}

async fn delete_job_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Job file {} was already gone", path.display())
        }
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// The registry map lives in memory, so PDFs found at startup belong to no
/// job and would never be swept.
fn remove_stale_pdfs(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for path in entries.flatten().map(|e| e.path()) {
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("pdf") {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale job file {}: {}", path.display(), e),
        }
    }
    removed
}

/// Rename, falling back to copy + delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), Doc2TextError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| Doc2TextError::io(format!("moving {} into job storage", from.display()), e))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!("Copied {} but could not remove it: {}", from.display(), e);
    }
    Ok(())
}
