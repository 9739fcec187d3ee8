//! File-based storage backend for persistent storage.
//!
//! Collections live in memory and every mutation is appended to an
//! operation log before it is applied. Opening the backend replays the log.
//! A torn or corrupt tail is cut off so later appends start on a frame
//! boundary.

use crate::backend::{StorageBackend, UpsertOutcome};
use crate::error::{StorageError, StorageResult};
use crate::log::{decode_log, encode_frame, LogOp, LogTail};
use crate::tables::Tables;
use deferdb_codec::{Record, Value};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Options for opening a [`FileBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOptions {
    /// Call `sync_data` after every appended frame.
    pub sync_on_write: bool,
    /// Create missing parent directories on open.
    pub create_dirs: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            sync_on_write: false,
            create_dirs: true,
        }
    }
}

impl FileOptions {
    /// Sets whether every write is synced to disk.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether missing parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }
}

/// What replaying the log found on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Frames replayed.
    pub applied: usize,
    /// Bytes cut from the end of the log.
    pub discarded_bytes: u64,
    /// How the log ended before truncation.
    pub tail: LogTail,
}

impl RecoveryReport {
    /// Whether the log ended cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.tail == LogTail::Clean
    }
}

/// Read-only summary of a log file, produced by [`FileBackend::verify`].
#[derive(Debug, Clone)]
pub struct LogReport {
    /// Valid frames.
    pub frames: usize,
    /// Length of the valid prefix.
    pub valid_bytes: u64,
    /// Length of the file.
    pub total_bytes: u64,
    /// How the log ended.
    pub tail: LogTail,
    /// Live record count per collection after replay.
    pub collections: BTreeMap<String, usize>,
}

/// A persistent storage backend replayed from an operation log.
///
/// # Thread Safety
///
/// Reads share a read lock over the tables. Writes hold the table write lock
/// while the frame is appended, so the log order matches the applied order.
///
/// # Example
///
/// ```no_run
/// use deferdb_codec::{Record, Value};
/// use deferdb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("data.dlog")).unwrap();
/// backend.upsert_fields("users", "id", &Value::from("a"), &Record::new()).unwrap();
/// backend.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    options: FileOptions,
    tables: RwLock<Tables>,
    log: Mutex<File>,
    recovery: RecoveryReport,
    /// Set when a failed write could not be rolled back.
    poisoned: AtomicBool,
    /// Held for exclusive access.
    _lock_file: File,
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn compact_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".compact");
    PathBuf::from(name)
}

fn apply(tables: &mut Tables, op: LogOp) {
    match op {
        LogOp::Upsert {
            collection,
            field,
            value,
            fields,
        } => {
            tables.upsert(&collection, &field, &value, &fields);
        }
        LogOp::Insert { collection, record } => tables.insert_raw(&collection, record),
        LogOp::Remove {
            collection,
            field,
            value,
        } => {
            tables.remove(&collection, &field, &value);
        }
    }
}

/// The log file as the append path sees it.
trait LogSink: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Appends one frame. On a failed write or sync the log is cut back to
/// where the frame started, so later frames never follow a partial one.
///
/// Returns `Corrupted` if the cut itself fails.
fn write_frame<S: LogSink>(sink: &mut S, frame: &[u8], sync: bool) -> StorageResult<()> {
    let start = sink.stream_position()?;
    let written = sink
        .write_all(frame)
        .and_then(|()| if sync { sink.sync() } else { Ok(()) });

    if let Err(err) = written {
        sink.truncate_to(start)
            .and_then(|()| sink.seek(SeekFrom::Start(start)).map(drop))
            .map_err(|rollback| {
                StorageError::corrupted(format!(
                    "append at offset {start} failed ({err}) and could not be rolled back: {rollback}"
                ))
            })?;
        return Err(err.into());
    }
    Ok(())
}

fn read_all(path: &Path) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}

impl FileBackend {
    /// Opens or creates a log at `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// handle, or cannot be truncated after a bad tail.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_options(path, FileOptions::default())
    }

    /// Opens or creates a log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// handle, or cannot be truncated after a bad tail.
    pub fn open_with_options(path: &Path, options: FileOptions) -> StorageResult<Self> {
        if options.create_dirs {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let decoded = decode_log(&bytes);
        let total = bytes.len() as u64;
        let discarded_bytes = total - decoded.valid_len;
        if discarded_bytes > 0 {
            file.set_len(decoded.valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        let applied = decoded.ops.len();
        let mut tables = Tables::default();
        for op in decoded.ops {
            apply(&mut tables, op);
        }

        Ok(Self {
            path: path.to_path_buf(),
            options,
            tables: RwLock::new(tables),
            log: Mutex::new(file),
            recovery: RecoveryReport {
                applied,
                discarded_bytes,
                tail: decoded.tail,
            },
            poisoned: AtomicBool::new(false),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the options the backend was opened with.
    #[must_use]
    pub fn options(&self) -> FileOptions {
        self.options
    }

    /// Returns what replay found when the backend was opened.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn log_size(&self) -> StorageResult<u64> {
        Ok(self.log.lock().metadata()?.len())
    }

    /// Rewrites the log to hold one insert frame per live record.
    ///
    /// The new log is written beside the old one, synced, then renamed over
    /// it. Later appends go through the handle the new log was written with,
    /// so they always land in the file at `path`. Returns the log size after
    /// compaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log cannot be written or renamed.
    pub fn compact(&self) -> StorageResult<u64> {
        let tables = self.tables.write();
        let mut log = self.log.lock();

        let temp = compact_path(&self.path);
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        for (collection, record) in tables.iter_records() {
            let frame = encode_frame(&LogOp::Insert {
                collection: collection.to_string(),
                record: record.clone(),
            })?;
            out.write_all(&frame)?;
        }
        out.sync_all()?;
        let size = out.seek(SeekFrom::End(0))?;

        fs::rename(&temp, &self.path)?;
        *log = out;
        self.poisoned.store(false, Ordering::SeqCst);
        Ok(size)
    }

    /// Reads and replays the log at `path` without opening it for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn verify(path: &Path) -> StorageResult<LogReport> {
        let bytes = read_all(path)?;
        let decoded = decode_log(&bytes);

        let frames = decoded.ops.len();
        let mut tables = Tables::default();
        for op in decoded.ops {
            apply(&mut tables, op);
        }

        let mut collections = BTreeMap::new();
        for (name, _) in tables.iter_records() {
            *collections.entry(name.to_string()).or_insert(0) += 1;
        }

        Ok(LogReport {
            frames,
            valid_bytes: decoded.valid_len,
            total_bytes: bytes.len() as u64,
            tail: decoded.tail,
            collections,
        })
    }

    fn append(&self, op: &LogOp) -> StorageResult<()> {
        let frame = encode_frame(op)?;
        let mut log = self.log.lock();
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(StorageError::corrupted(format!(
                "{} holds a partial frame; reopen to recover",
                self.path.display()
            )));
        }
        let result = write_frame(&mut *log, &frame, self.options.sync_on_write);
        if let Err(StorageError::Corrupted(_)) = &result {
            self.poisoned.store(true, Ordering::SeqCst);
        }
        result
    }
}

impl StorageBackend for FileBackend {
    fn find(&self, collection: &str, field: &str, value: &Value) -> StorageResult<Vec<Record>> {
        Ok(self.tables.read().find(collection, field, value))
    }

    fn scan(&self, collection: &str) -> StorageResult<Vec<Record>> {
        Ok(self.tables.read().scan(collection))
    }

    fn upsert_fields(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: &Record,
    ) -> StorageResult<UpsertOutcome> {
        let mut tables = self.tables.write();
        self.append(&LogOp::Upsert {
            collection: collection.to_string(),
            field: field.to_string(),
            value: value.clone(),
            fields: fields.clone(),
        })?;
        Ok(tables.upsert(collection, field, value, fields))
    }

    fn remove_where(&self, collection: &str, field: &str, value: &Value) -> StorageResult<usize> {
        let mut tables = self.tables.write();
        if tables.find(collection, field, value).is_empty() {
            return Ok(0);
        }
        self.append(&LogOp::Remove {
            collection: collection.to_string(),
            field: field.to_string(),
            value: value.clone(),
        })?;
        Ok(tables.remove(collection, field, value))
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        Ok(self.tables.read().names())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut log = self.log.lock();
        log.flush()?;
        log.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let backend = FileBackend::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(backend.log_size().unwrap(), 0);
        assert!(backend.recovery().is_clean());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new().with("n", 1i64))
                .unwrap();
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new().with("m", 2i64))
                .unwrap();
            backend
                .upsert_fields("users", "id", &id("b"), &Record::new())
                .unwrap();
            backend.remove_where("users", "id", &id("b")).unwrap();
            backend.flush().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.recovery().applied, 4);
        let found = backend.find("users", "id", &id("a")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("n"), Some(&Value::Integer(1)));
        assert_eq!(found[0].get("m"), Some(&Value::Integer(2)));
        assert!(backend.find("users", "id", &id("b")).unwrap().is_empty());
    }

    #[test]
    fn file_remove_without_match_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.remove_where("users", "id", &id("a")).unwrap(), 0);
        assert_eq!(backend.log_size().unwrap(), 0);
    }

    #[test]
    fn file_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let good_len = {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new())
                .unwrap();
            backend.flush().unwrap();
            backend.log_size().unwrap()
        };

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"DLOG\x01\x00\xff").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.recovery().tail, LogTail::Torn);
        assert_eq!(backend.recovery().discarded_bytes, 7);
        assert_eq!(backend.log_size().unwrap(), good_len);
        assert_eq!(backend.scan("users").unwrap().len(), 1);
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.dlog");

        FileBackend::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_without_create_dirs_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("test.dlog");

        let options = FileOptions::default().create_dirs(false);
        let result = FileBackend::open_with_options(&path, options);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn file_compact_shrinks_and_preserves() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let backend = FileBackend::open(&path).unwrap();
        for n in 0..20i64 {
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new().with("n", n))
                .unwrap();
        }
        let before = backend.log_size().unwrap();
        let after = backend.compact().unwrap();
        assert!(after < before);

        backend
            .upsert_fields("users", "id", &id("b"), &Record::new())
            .unwrap();
        backend.flush().unwrap();
        drop(backend);

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.recovery().applied, 2);
        let a = &backend.find("users", "id", &id("a")).unwrap()[0];
        assert_eq!(a.get("n"), Some(&Value::Integer(19)));
    }

    #[test]
    fn file_appends_after_compact_reach_the_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let backend = FileBackend::open(&path).unwrap();
        backend
            .upsert_fields("users", "id", &id("a"), &Record::new())
            .unwrap();
        backend.compact().unwrap();
        backend
            .upsert_fields("users", "id", &id("b"), &Record::new())
            .unwrap();
        backend.flush().unwrap();

        assert_eq!(
            backend.log_size().unwrap(),
            fs::metadata(&path).unwrap().len()
        );
        assert!(!compact_path(&path).exists());
        assert_eq!(FileBackend::verify(&path).unwrap().frames, 2);
    }

    /// Writes at most `budget` bytes, then fails like a full disk.
    struct ShortFile {
        file: File,
        budget: usize,
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left"));
            }
            let n = self.file.write(&buf[..buf.len().min(self.budget)])?;
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl Seek for ShortFile {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.file.seek(pos)
        }
    }

    impl LogSink for ShortFile {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.file.set_len(len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_data()
        }
    }

    fn upsert_frame(key: &str) -> Vec<u8> {
        encode_frame(&LogOp::Upsert {
            collection: "users".into(),
            field: "id".into(),
            value: id(key),
            fields: Record::new(),
        })
        .unwrap()
    }

    #[test]
    fn failed_append_leaves_no_partial_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new())
                .unwrap();
            backend.flush().unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();

        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::End(0)).unwrap();
        let frame = upsert_frame("lost");
        let mut short = ShortFile {
            file,
            budget: frame.len() / 2,
        };
        let err = write_frame(&mut short, &frame, false).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        let mut file = short.file;
        write_frame(&mut file, &upsert_frame("b"), true).unwrap();
        drop(file);

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.recovery().is_clean());
        assert_eq!(backend.recovery().applied, 2);
        assert_eq!(backend.find("users", "id", &id("b")).unwrap().len(), 1);
        assert!(backend.find("users", "id", &id("lost")).unwrap().is_empty());
    }

    #[test]
    fn file_verify_reports_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .upsert_fields("users", "id", &id("a"), &Record::new())
                .unwrap();
            backend
                .upsert_fields("groups", "id", &id("g"), &Record::new())
                .unwrap();
            backend
                .upsert_fields("users", "id", &id("b"), &Record::new())
                .unwrap();
            backend.flush().unwrap();
        }

        let report = FileBackend::verify(&path).unwrap();
        assert_eq!(report.frames, 3);
        assert_eq!(report.tail, LogTail::Clean);
        assert_eq!(report.valid_bytes, report.total_bytes);
        assert_eq!(report.collections.get("users"), Some(&2));
        assert_eq!(report.collections.get("groups"), Some(&1));
    }

    #[test]
    fn file_sync_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let options = FileOptions::default().sync_on_write(true);
        let backend = FileBackend::open_with_options(&path, options).unwrap();
        assert!(backend.options().sync_on_write);
        backend
            .upsert_fields("users", "id", &id("a"), &Record::new())
            .unwrap();
        assert!(backend.log_size().unwrap() > 0);
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dlog");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.path(), path);
    }
}
