use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Delay collapsing rapid authorization flips into one write
pub const SAVE_DELAY: Duration = Duration::from_secs(1);

/// On-disk format
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoredAuth {
    authorized: bool,
}

/// Persisted authorization flag with debounced saving
///
/// Every change cancels the pending save and schedules a new one, so a
/// burst of changes produces a single write of the final value.
pub struct AuthStore {
    /// None keeps the flag in memory only
    path: Option<PathBuf>,
    authorized: AtomicBool,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AuthStore {
    /// Load from `path`; a missing file means not authorized
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stored = if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read auth store {}", path.display()))?;
            serde_json::from_str::<StoredAuth>(&json)
                .with_context(|| format!("Failed to parse auth store {}", path.display()))?
        } else {
            StoredAuth::default()
        };

        Ok(Self {
            path: Some(path),
            authorized: AtomicBool::new(stored.authorized),
            delay: SAVE_DELAY,
            pending: Mutex::new(None),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            authorized: AtomicBool::new(false),
            delay: SAVE_DELAY,
            pending: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// Update the flag and schedule a debounced save
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
        self.schedule_save();
    }

    fn schedule_save(&self) {
        let Some(path) = self.path.clone() else {
            return;
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime there is nothing to debounce with
            if let Err(e) = write_atomic(&path, self.snapshot()) {
                error!(error = %e, "Failed to save auth store");
            }
            return;
        };

        let delay = self.delay;
        let stored = self.snapshot();
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let result = tokio::task::spawn_blocking(move || write_atomic(&path, stored)).await;
            match result {
                Ok(Ok(())) => debug!("Auth store saved"),
                Ok(Err(e)) => error!(error = %e, "Failed to save auth store"),
                Err(e) => error!(error = %e, "Auth store save task failed"),
            }
        }));
    }

    /// Cancel any pending save and write now
    pub fn flush(&self) -> Result<()> {
        if let Some(task) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        match &self.path {
            Some(path) => write_atomic(path, self.snapshot()),
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> StoredAuth {
        StoredAuth {
            authorized: self.authorized(),
        }
    }
}

/// Write to a .tmp sibling, then rename over the target
fn write_atomic(path: &Path, stored: StoredAuth) -> Result<()> {
    let json = serde_json::to_string_pretty(&stored).context("Failed to serialize auth store")?;
    let tmp_path = path.with_extension("tmp");

    fs::write(&tmp_path, json).context("Failed to write temporary auth store")?;
    fs::rename(&tmp_path, path).context("Failed to rename temporary auth store")?;

    Ok(())
}
