use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use launchguard_stalker::RetentionRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("Pending check store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pending check store is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A retention check waiting for its due time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCheck {
    pub mint: String,
    pub creation_tx_id: String,
    pub slot: u64,
    pub initial_buyers: Vec<String>,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub funding_note: Option<String>,
}

impl PendingCheck {
    pub fn to_request(&self) -> RetentionRequest {
        RetentionRequest {
            mint: self.mint.clone(),
            creation_slot: self.slot,
            initial_buyers: self.initial_buyers.clone(),
            funding_note: self.funding_note.clone(),
        }
    }

    fn remaining(&self) -> Duration {
        (self.due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
pub trait DueCheckHandler: Send + Sync + 'static {
    async fn on_due(&self, check: PendingCheck);
}

struct SchedulerInner {
    path: PathBuf,
    /// Keyed by mint
    pending: Mutex<BTreeMap<String, PendingCheck>>,
    /// Timers still waiting for their due time. A check leaves this map
    /// when it is claimed for evaluation.
    timers: DashMap<String, JoinHandle<()>>,
    handler: Arc<dyn DueCheckHandler>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Retention checks persisted to a JSON file and armed on tokio timers.
#[derive(Clone)]
pub struct RetentionScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for RetentionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionScheduler")
            .field("path", &self.inner.path)
            .field("armed", &self.inner.timers.len())
            .finish_non_exhaustive()
    }
}

impl RetentionScheduler {
    /// Loads any persisted checks without arming them. Call `restore` once
    /// the handler side is ready.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(
        path: impl AsRef<Path>,
        handler: Arc<dyn DueCheckHandler>,
    ) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pending = match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                let checks: Vec<PendingCheck> = serde_json::from_str(&content)?;
                checks.into_iter().map(|c| (c.mint.clone(), c)).collect()
            }
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(pending = pending.len(), "⏰ Retention scheduler opened");

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                path,
                pending: Mutex::new(pending),
                timers: DashMap::new(),
                handler,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        })
    }

    /// Arms every persisted check. Overdue checks fire immediately.
    pub async fn restore(&self) -> usize {
        let checks: Vec<PendingCheck> = self.inner.pending.lock().await.values().cloned().collect();
        for check in &checks {
            if check.remaining().is_zero() {
                info!(mint = %check.mint, due_at = %check.due_at, "Overdue retention check, running now");
            }
            self.arm(check.clone());
        }
        if !checks.is_empty() {
            info!(restored = checks.len(), "🔁 Re-armed persisted retention checks");
        }
        checks.len()
    }

    #[instrument(skip(self, check), fields(mint = %check.mint, due_at = %check.due_at))]
    pub async fn schedule(&self, check: PendingCheck) -> Result<(), SchedulerError> {
        {
            let mut pending = self.inner.pending.lock().await;
            if pending.contains_key(&check.mint) {
                warn!("Retention check already pending, keeping the existing one");
                return Ok(());
            }
            pending.insert(check.mint.clone(), check.clone());
            persist(&self.inner.path, &pending).await?;
        }
        debug!("Retention check scheduled");
        self.arm(check);
        Ok(())
    }

    /// Aborts and forgets one check. Returns false when none was pending.
    pub async fn cancel(&self, mint: &str) -> Result<bool, SchedulerError> {
        if let Some((_, timer)) = self.inner.timers.remove(mint) {
            timer.abort();
        }
        let mut pending = self.inner.pending.lock().await;
        if pending.remove(mint).is_none() {
            return Ok(false);
        }
        persist(&self.inner.path, &pending).await?;
        info!(mint = %mint, "Retention check cancelled");
        Ok(true)
    }

    pub async fn pending(&self) -> Vec<PendingCheck> {
        self.inner.pending.lock().await.values().cloned().collect()
    }

    pub fn armed(&self) -> usize {
        self.inner.timers.iter().filter(|t| !t.value().is_finished()).count()
    }

    /// Checks currently being evaluated.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Stops every waiting timer and gives checks already being evaluated up
    /// to `grace` to finish. Waiting checks stay on disk and re-arm on the
    /// next start; claimed checks are already off disk and never run twice.
    pub async fn shutdown(&self, grace: Duration) {
        let armed = {
            // Holding the store lock means no timer is halfway through a claim.
            let _pending = self.inner.pending.lock().await;
            let armed = self.armed();
            for timer in self.inner.timers.iter() {
                timer.value().abort();
            }
            self.inner.timers.clear();
            armed
        };

        let drained = tokio::time::timeout(grace, self.wait_idle()).await.is_ok();
        if drained {
            info!(armed, "🛑 Retention scheduler stopped, pending checks kept on disk");
        } else {
            warn!(
                armed,
                in_flight = self.in_flight(),
                "Retention scheduler stopped with checks still running"
            );
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn arm(&self, check: PendingCheck) {
        self.inner.timers.retain(|_, timer| !timer.is_finished());

        let inner = self.inner.clone();
        let mint = check.mint.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(check.remaining()).await;
            if !claim(&inner, &check.mint).await {
                debug!(mint = %check.mint, "Retention check no longer pending");
                return;
            }

            inner.handler.on_due(check).await;

            if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });

        if let Some(previous) = self.inner.timers.insert(mint, timer) {
            previous.abort();
        }
    }
}

/// Takes a due check off the store before it is evaluated, so a restart can
/// never replay a check whose signal may already be out. False when the
/// check was cancelled in the meantime.
async fn claim(inner: &SchedulerInner, mint: &str) -> bool {
    let mut pending = inner.pending.lock().await;
    if pending.remove(mint).is_none() {
        return false;
    }
    // Past this point shutdown must wait for the check rather than abort it.
    inner.timers.remove(mint);
    inner.in_flight.fetch_add(1, Ordering::SeqCst);

    if let Err(e) = persist(&inner.path, &pending).await {
        error!(mint = %mint, error = %e, "Failed to drop claimed retention check from store");
    }
    true
}

/// Temp file then rename, so a crash never leaves a torn store.
async fn persist(path: &Path, pending: &BTreeMap<String, PendingCheck>) -> Result<(), SchedulerError> {
    let mut checks: Vec<&PendingCheck> = pending.values().collect();
    checks.sort_by_key(|c| c.due_at);
    let body = serde_json::to_vec_pretty(&checks)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
