//! File-backed snapshot store.
//!
//! Writes go through a temporary file in the same directory which is fsynced
//! and then renamed over the target, so a crash leaves either the old or the
//! new snapshot on disk, never a torn one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace};

use super::record::SnapshotRecord;
use crate::alloc::BlockAllocator;
use crate::error::SnapshotError;

/// Period of the background saver unless configured otherwise.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// The serialized state matched the last written snapshot.
    Unchanged,
}

/// Counters of save attempts since the store was created.
#[derive(Debug, Default)]
pub struct SaveStats {
    writes: AtomicU64,
    unchanged: AtomicU64,
    failures: AtomicU64,
}

impl SaveStats {
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn unchanged(&self) -> u64 {
        self.unchanged.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    last_written: Mutex<Vec<u8>>,
    stats: SaveStats,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(SnapshotError::io(
                path,
                std::io::Error::new(ErrorKind::InvalidInput, "snapshot file name is empty"),
            ));
        }

        Ok(Self {
            path,
            last_written: Mutex::new(Vec::new()),
            stats: SaveStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &SaveStats {
        &self.stats
    }

    /// Canonical YAML form of the allocator, read under its lock.
    pub fn serialize(allocator: &BlockAllocator) -> Result<Vec<u8>, SnapshotError> {
        let record = SnapshotRecord::capture(allocator);
        serde_yaml::to_string(&record)
            .map(String::into_bytes)
            .map_err(SnapshotError::Encode)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<BlockAllocator, SnapshotError> {
        let record: SnapshotRecord =
            serde_yaml::from_slice(bytes).map_err(SnapshotError::Malformed)?;
        record.into_allocator()
    }

    /// Writes the allocator state unless it is byte-identical to the last
    /// snapshot this store wrote or restored.
    pub fn save(&self, allocator: &BlockAllocator) -> Result<SaveOutcome, SnapshotError> {
        let result = self.save_inner(allocator);
        match &result {
            Ok(SaveOutcome::Written) => self.stats.writes.fetch_add(1, Ordering::Relaxed),
            Ok(SaveOutcome::Unchanged) => self.stats.unchanged.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failures.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn save_inner(&self, allocator: &BlockAllocator) -> Result<SaveOutcome, SnapshotError> {
        // Held from capture through the write so concurrent saves can't
        // reorder on disk.
        let mut last = self.last_written.lock();
        let bytes = Self::serialize(allocator)?;
        if *last == bytes {
            trace!(path = %self.path.display(), "Snapshot unchanged, skipping write");
            return Ok(SaveOutcome::Unchanged);
        }

        self.write_atomic(&bytes)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot written");
        *last = bytes;
        Ok(SaveOutcome::Written)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".into());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            SnapshotError::io(&self.path, e)
        })?;

        // Persist the rename itself; not every platform lets a directory be opened.
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Loads the allocator from the snapshot file.
    ///
    /// The file content becomes the change-detection baseline, so an
    /// untouched restored allocator is not rewritten by the next save.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn restore(&self) -> Result<BlockAllocator, SnapshotError> {
        let bytes = fs::read(&self.path).map_err(|e| SnapshotError::io(&self.path, e))?;
        let allocator = Self::deserialize(&bytes)?;
        *self.last_written.lock() = bytes;
        info!("Allocator state restored from snapshot");
        Ok(allocator)
    }

    /// Deletes the snapshot file. Returns whether a file was removed.
    pub fn wipe(&self) -> Result<bool, SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.last_written.lock().clear();
                info!(path = %self.path.display(), "Snapshot wiped");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapshotError::io(&self.path, e)),
        }
    }

    /// Saves every `period` until `cancel` flips to `true` or its sender is
    /// dropped. Cancellation does not flush; the owner performs a final
    /// [`save`](Self::save) on shutdown.
    pub async fn run_saver(
        &self,
        allocator: &BlockAllocator,
        period: Duration,
        mut cancel: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_secs = period.as_secs_f64(), "Snapshot saver started");

        loop {
            if *cancel.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.save(allocator) {
                        error!("Periodic snapshot save failed: {e}");
                    }
                }
            }
        }
        info!("Snapshot saver cancelled");
    }
}
