//! Compact command implementation.

use super::{require_log, CommandResult};
use deferdb_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::{info, warn};

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Frames before compaction.
    pub frames_before: usize,
    /// Live records, one frame each after compaction.
    pub live_records: usize,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction. `None` for a dry run.
    pub bytes_after: Option<u64>,
}

/// Compacts the log at `path`, or only reports on it when `dry_run` is set.
///
/// A real run opens the log for writing, so it fails while a database
/// holds it, and it discards any torn or corrupt tail first.
pub fn compact(path: &Path, dry_run: bool) -> CommandResult<CompactStats> {
    require_log(path)?;
    let report = FileBackend::verify(path)?;
    let live_records = report.collections.values().sum();

    if dry_run {
        return Ok(CompactStats {
            frames_before: report.frames,
            live_records,
            bytes_before: report.total_bytes,
            bytes_after: None,
        });
    }

    let backend = FileBackend::open(path)?;
    if !backend.recovery().is_clean() {
        warn!(
            "discarded {} trailing bytes before compaction",
            backend.recovery().discarded_bytes
        );
    }
    let bytes_after = backend.compact()?;
    backend.flush()?;
    info!(
        "compacted {:?}: {} -> {} bytes",
        path, report.total_bytes, bytes_after
    );

    Ok(CompactStats {
        frames_before: report.frames,
        live_records,
        bytes_before: report.total_bytes,
        bytes_after: Some(bytes_after),
    })
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CommandResult<()> {
    println!("Compacting operation log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;

    println!("  Frames before: {}", stats.frames_before);
    println!("  Live records:  {}", stats.live_records);
    println!("  Size before:   {} bytes", stats.bytes_before);
    if let Some(after) = stats.bytes_after {
        println!("  Size after:    {} bytes", after);
        println!(
            "  Space saved:   {} bytes",
            stats.bytes_before.saturating_sub(after)
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_log;
    use deferdb_codec::Value;

    #[test]
    fn dry_run_leaves_log_alone() {
        let (_dir, path) = sample_log();
        let before = std::fs::metadata(&path).unwrap().len();

        let stats = compact(&path, true).unwrap();
        assert_eq!(stats.frames_before, 5);
        assert_eq!(stats.live_records, 2);
        assert!(stats.bytes_after.is_none());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn compaction_keeps_live_records() {
        let (_dir, path) = sample_log();
        let stats = compact(&path, false).unwrap();
        assert!(stats.bytes_after.unwrap() < stats.bytes_before);

        let report = FileBackend::verify(&path).unwrap();
        assert_eq!(report.frames, 2);

        let backend = FileBackend::open(&path).unwrap();
        let users = backend.find("users", "id", &Value::from("u1")).unwrap();
        assert_eq!(users[0].get_text("name"), Some("anne"));
        assert!(backend
            .find("users", "id", &Value::from("u2"))
            .unwrap()
            .is_empty());
    }
}
