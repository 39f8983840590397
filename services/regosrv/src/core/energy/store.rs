//! Energy snapshot persistence
//!
//! Snapshots are written to a temporary file in the target directory,
//! flushed to disk and renamed over the previous snapshot. A crash at any
//! point leaves either the old or the new file, never a torn one.

use errors::{RegoError, RegoResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::accumulator::EnergyState;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot; missing or unreadable files start from zero
    pub fn load(&self) -> EnergyState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No energy snapshot at {}, starting from 0 kWh",
                    self.path.display()
                );
                return EnergyState::default();
            },
            Err(e) => {
                warn!(
                    "Energy snapshot {} unreadable ({}), starting from 0 kWh",
                    self.path.display(),
                    e
                );
                return EnergyState::default();
            },
        };

        match serde_json::from_str::<EnergyState>(&content) {
            Ok(state) => {
                let state = state.sanitized();
                info!(
                    "Energy snapshot loaded: {:.3} kWh from {}",
                    state.accumulated_kwh,
                    self.path.display()
                );
                state
            },
            Err(e) => {
                warn!(
                    "Energy snapshot {} corrupt ({}), starting from 0 kWh",
                    self.path.display(),
                    e
                );
                EnergyState::default()
            },
        }
    }

    /// Atomically replace the snapshot file
    pub fn save(&self, state: &EnergyState) -> RegoResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let failed = |reason: String| RegoError::persistence(self.path.display().to_string(), reason);

        std::fs::create_dir_all(dir).map_err(|e| failed(e.to_string()))?;
        let json = serde_json::to_vec_pretty(state)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| failed(e.to_string()))?;
        temp.write_all(&json)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| failed(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| failed(e.error.to_string()))?;

        debug!(
            "Energy snapshot saved: {:.3} kWh -> {}",
            state.accumulated_kwh,
            self.path.display()
        );
        Ok(())
    }
}

/// Periodic snapshot writer
///
/// Failures are logged; the previous file stays authoritative and the next
/// tick tries again. The final snapshot at shutdown is written by the caller.
pub async fn run_persistence(
    store: SnapshotStore,
    energy: watch::Receiver<EnergyState>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Energy persistence stopped");
                return;
            }
            _ = ticker.tick() => {
                let snapshot = energy.borrow().clone();
                if let Err(e) = store.save(&snapshot) {
                    error!("Energy snapshot write failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn state(kwh: f64) -> EnergyState {
        EnergyState {
            accumulated_kwh: kwh,
            last_sample_timestamp: Some(Utc::now()),
            last_power_w: Some(1500.0),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("energy_total.json"));

        store.save(&state(42.125)).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.accumulated_kwh, 42.125);
        assert_eq!(loaded.last_power_w, Some(1500.0));
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("energy_total.json"));

        store.save(&state(1.0)).unwrap();
        store.save(&state(2.0)).unwrap();
        assert_eq!(store.load().accumulated_kwh, 2.0);

        // Only the snapshot itself remains in the directory
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("data").join("energy_total.json"));
        store.save(&state(3.5)).unwrap();
        assert_eq!(store.load().accumulated_kwh, 3.5);
    }

    #[test]
    fn test_missing_file_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().accumulated_kwh, 0.0);
    }

    #[test]
    fn test_corrupt_file_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("energy_total.json");
        std::fs::write(&path, b"{\"accumulated_kwh\": 12.").unwrap();
        assert_eq!(SnapshotStore::new(path).load().accumulated_kwh, 0.0);
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("energy_total.json");
        let store = SnapshotStore::new(&path);
        store.save(&state(7.0)).unwrap();

        // A directory in place of the target makes the rename fail
        let blocked = SnapshotStore::new(dir.path());
        assert!(blocked.save(&state(8.0)).is_err());
        assert_eq!(store.load().accumulated_kwh, 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_persistence() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("energy_total.json"));
        let (tx, rx) = watch::channel(state(5.0));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_persistence(
            store.clone(),
            rx,
            Duration::from_secs(600),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(store.load().accumulated_kwh, 5.0);

        tx.send_replace(state(6.0));
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.load().accumulated_kwh, 6.0);

        cancel.cancel();
        task.await.unwrap();
    }
}
