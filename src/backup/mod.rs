//! Backup manager - time-gated snapshots of the data directory
//!
//! `tick()` runs after every successful write. At most one snapshot per
//! interval is produced, even under concurrent writers: the timestamp cache
//! is re-checked under the lock and the archive is written while holding it.
//! Backup failures are logged and never fail the calling operation.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{MnemonError, Result};

/// Snapshot filename prefix and timestamp layout
const BACKUP_PREFIX: &str = "memory_backup_";
const BACKUP_EXT: &str = "zip";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub interval_hours: u64,
    pub retention_count: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./backups"),
            interval_hours: 24,
            retention_count: 10,
        }
    }
}

pub struct BackupManager {
    config: BackupConfig,
    data_dir: PathBuf,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl BackupManager {
    /// Create a manager; the cache is seeded from the newest snapshot
    /// already on disk so restarts do not trigger an immediate backup.
    pub fn new(data_dir: &Path, config: BackupConfig) -> Self {
        let seeded = newest_snapshot_time(&config.path);
        Self {
            config,
            data_dir: data_dir.to_path_buf(),
            last: Mutex::new(seeded),
        }
    }

    /// Called after every successful write-path operation
    pub fn tick(&self) {
        if !self.config.enabled {
            return;
        }
        // Fast path: cache says we are inside the interval
        if !self.due(*self.last.lock()) {
            return;
        }

        let mut guard = self.last.lock();
        // Another writer may have snapshotted while we waited on the lock
        if !self.due(*guard) {
            return;
        }

        match self.create_snapshot() {
            Ok(path) => {
                *guard = Some(Utc::now());
                tracing::info!(path = %path.display(), "backup snapshot created");
                if let Err(e) = self.prune() {
                    tracing::warn!("backup retention pruning failed: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("backup snapshot failed: {}", e);
            }
        }
    }

    fn due(&self, last: Option<DateTime<Utc>>) -> bool {
        match last {
            None => true,
            Some(ts) => Utc::now() - ts >= Duration::hours(self.config.interval_hours as i64),
        }
    }

    /// Timestamp of the most recent snapshot, if any
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        *self.last.lock()
    }

    /// Drop the cached timestamp; the next tick will re-create a snapshot
    pub fn invalidate_cache(&self) {
        *self.last.lock() = None;
    }

    /// Existing snapshots, newest first
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut snapshots: Vec<PathBuf> = match std::fs::read_dir(&self.config.path) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| is_snapshot(p))
                .collect(),
            Err(_) => return Ok(vec![]),
        };
        // Filename timestamps sort lexicographically
        snapshots.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(snapshots)
    }

    /// Archive the whole data directory into one zip file
    fn create_snapshot(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.path)?;

        let stamp = Utc::now().format(TIMESTAMP_FORMAT);
        let target = self
            .config
            .path
            .join(format!("{}{}.{}", BACKUP_PREFIX, stamp, BACKUP_EXT));

        let file = File::create(&target)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let mut buffer = Vec::new();
        for entry in walk_files(&self.data_dir)? {
            let relative = entry
                .strip_prefix(&self.data_dir)
                .map_err(|e| MnemonError::Internal(format!("path outside data dir: {}", e)))?;
            let name = relative.to_string_lossy().replace('\\', "/");

            writer
                .start_file(name, options)
                .map_err(|e| MnemonError::StoreIo(format!("zip write failed: {}", e)))?;
            let mut source = File::open(&entry)?;
            buffer.clear();
            source.read_to_end(&mut buffer)?;
            writer.write_all(&buffer)?;
        }

        writer
            .finish()
            .map_err(|e| MnemonError::StoreIo(format!("zip finish failed: {}", e)))?;

        Ok(target)
    }

    /// Keep only the newest `retention_count` snapshots
    fn prune(&self) -> Result<()> {
        let snapshots = self.list()?;
        for stale in snapshots.iter().skip(self.config.retention_count) {
            if let Err(e) = std::fs::remove_file(stale) {
                tracing::warn!(path = %stale.display(), "failed to remove stale backup: {}", e);
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }
}

fn is_snapshot(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(&format!(".{}", BACKUP_EXT)))
        .unwrap_or(false)
}

/// Parse the timestamp back out of a snapshot filename
fn snapshot_time(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stamp = name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(&format!(".{}", BACKUP_EXT))?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

fn newest_snapshot_time(backup_dir: &Path) -> Option<DateTime<Utc>> {
    let entries = std::fs::read_dir(backup_dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_snapshot(p))
        .filter_map(|p| snapshot_time(&p))
        .max()
}

/// Recursively list all regular files under `root`
fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn setup(interval_hours: u64) -> (tempfile::TempDir, tempfile::TempDir, BackupManager) {
        let data = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(data.path().join("memory.sqlite"), b"relational bytes").unwrap();
        std::fs::create_dir_all(data.path().join("chroma")).unwrap();
        std::fs::write(data.path().join("chroma").join("vectors.sqlite"), b"vector bytes")
            .unwrap();

        let manager = BackupManager::new(
            data.path(),
            BackupConfig {
                enabled: true,
                path: backups.path().to_path_buf(),
                interval_hours,
                retention_count: 3,
            },
        );
        (data, backups, manager)
    }

    #[test]
    fn test_first_tick_creates_snapshot() {
        let (_data, _backups, manager) = setup(1);
        assert!(manager.last_timestamp().is_none());

        manager.tick();

        assert!(manager.last_timestamp().is_some());
        let snapshots = manager.list().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(is_snapshot(&snapshots[0]));
    }

    #[test]
    fn test_second_tick_within_interval_is_gated() {
        let (_data, _backups, manager) = setup(1);
        manager.tick();
        manager.tick();
        manager.tick();

        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_invalidate_cache_forces_snapshot() {
        let (_data, _backups, manager) = setup(1);
        manager.tick();
        manager.invalidate_cache();
        // New snapshot lands in the same wall-clock second and overwrites
        // the old name, or in the next second as a second file
        manager.tick();

        assert!(manager.last_timestamp().is_some());
        assert!(!manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_manager_never_snapshots() {
        let data = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(
            data.path(),
            BackupConfig {
                enabled: false,
                path: backups.path().to_path_buf(),
                interval_hours: 1,
                retention_count: 3,
            },
        );

        manager.tick();
        assert!(manager.list().unwrap().is_empty());
        assert!(manager.last_timestamp().is_none());
    }

    #[test]
    fn test_concurrent_ticks_produce_one_snapshot() {
        let (_data, _backups, manager) = setup(1);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = manager.clone();
                std::thread::spawn(move || m.tick())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_cache_seeded_from_disk() {
        let (data, backups, manager) = setup(1);
        manager.tick();
        let first = manager.last_timestamp().unwrap();
        drop(manager);

        let reopened = BackupManager::new(
            data.path(),
            BackupConfig {
                enabled: true,
                path: backups.path().to_path_buf(),
                interval_hours: 1,
                retention_count: 3,
            },
        );
        let seeded = reopened.last_timestamp().unwrap();
        // Filename stamps are second-precision
        assert!((first - seeded).num_seconds().abs() <= 1);

        reopened.tick();
        assert_eq!(reopened.list().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_filename_round_trips() {
        let path = Path::new("memory_backup_2026-08-01_12-30-45.zip");
        let ts = snapshot_time(path).unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2026-08-01_12-30-45");
    }

    #[test]
    fn test_retention_pruning() {
        let (_data, backups, manager) = setup(1);
        // Plant stale snapshots older than anything tick() will write
        for i in 1..=5 {
            std::fs::write(
                backups
                    .path()
                    .join(format!("memory_backup_2020-01-0{}_00-00-00.zip", i)),
                b"stale",
            )
            .unwrap();
        }

        manager.invalidate_cache();
        manager.tick();

        let remaining = manager.list().unwrap();
        assert_eq!(remaining.len(), 3);
        // The freshly created snapshot is the newest and must survive
        assert!(snapshot_time(&remaining[0]).unwrap() > snapshot_time(&remaining[2]).unwrap());
    }

    #[test]
    fn test_snapshot_contains_data_dir_files() {
        let (_data, _backups, manager) = setup(1);
        manager.tick();

        let snapshot = &manager.list().unwrap()[0];
        let file = File::open(snapshot).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"memory.sqlite".to_string()));
        assert!(names.contains(&"chroma/vectors.sqlite".to_string()));
    }
}
