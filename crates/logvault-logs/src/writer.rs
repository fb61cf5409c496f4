//! Log writer with rotation support
//!
//! The writer is the sink of the tracing pipeline, so nothing in this module
//! may emit tracing events: doing so while the state lock is held would
//! re-enter the writer.

use chrono::{SecondsFormat, Utc};
use logvault_core::{ConfigModel, RotatedName, MAX_ROTATION_ATTEMPTS};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{LogError, Result, RotationError};
use crate::rotation::{RotationPolicy, RotationTrigger};

/// Pause before retrying a rotation that failed
const ROTATION_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Handle to the active log file.
///
/// Cloning is cheap and every clone appends to the same file. Appends and
/// rotations are serialized by one lock, so concurrent records never
/// interleave and never race a rotation.
#[derive(Clone)]
pub struct LogWriter {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    active_name: String,
    policy: RotationPolicy,
    state: Mutex<ActiveFile>,
}

struct ActiveFile {
    /// `None` between close and reopen, or after shutdown
    writer: Option<BufWriter<File>>,
    size: u64,
    opened_at: Instant,
    retry_after: Option<Instant>,
    rotations: u64,
    closed: bool,
}

impl LogWriter {
    /// Open (or create) the active file described by `config`
    pub fn open(config: &ConfigModel) -> Result<Self> {
        Self::new(config.active_path(), RotationPolicy::from(&config.rotation))
    }

    /// Create a new log writer appending to `path`
    pub fn new(path: PathBuf, policy: RotationPolicy) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let active_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| LogError::init(format!("{} has no file name", path.display())))?;

        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                active_name,
                policy,
                state: Mutex::new(ActiveFile {
                    writer: Some(BufWriter::new(file)),
                    size,
                    opened_at: Instant::now(),
                    retry_after: None,
                    rotations: 0,
                    closed: false,
                }),
            }),
        })
    }

    /// Append one serialized record.
    ///
    /// Rotation is decided before the bytes are written, so a record always
    /// lands whole in exactly one file. A failed rotation is reported into the
    /// current file and the record is still written; a failed write is
    /// returned to the caller.
    pub fn append(&self, record: &[u8]) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(LogError::Closed);
        }

        let incoming = record.len() as u64;
        let trigger = if state.rotation_allowed() {
            self.shared
                .policy
                .check_append(state.size, incoming, state.opened_at.elapsed())
        } else {
            None
        };

        if let Some(trigger) = trigger {
            if let Err(e) = self.rotate_locked(&mut state) {
                self.recover_locked(&mut state, trigger, &e)?;
            }
        }

        self.writer_locked(&mut state)?;
        if state.size == 0 {
            // Age counts from the first record, not from an idle empty file
            state.opened_at = Instant::now();
        }

        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;
        let written = writer.write_all(record).and_then(|()| writer.flush());
        if let Err(e) = written {
            // Part of the record may have landed; reopen to resync the size
            if let Some(writer) = state.writer.take() {
                let _ = writer.into_parts();
            }
            return Err(e.into());
        }
        state.size += incoming;
        Ok(())
    }

    /// Rotate if the active file has outlived its age limit.
    ///
    /// Returns the rotated file's path when a rotation happened.
    pub fn rotate_if_due(&self) -> Result<Option<PathBuf>> {
        let mut state = self.shared.state.lock();
        if state.closed || !state.rotation_allowed() {
            return Ok(None);
        }
        match self
            .shared
            .policy
            .check_age(state.size, state.opened_at.elapsed())
        {
            Some(trigger) => self.rotate_with_recovery(&mut state, trigger),
            None => Ok(None),
        }
    }

    /// Rotate now regardless of thresholds (no-op on an empty file)
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        let mut state = self.shared.state.lock();
        if state.closed || state.size == 0 {
            return Ok(None);
        }
        self.rotate_with_recovery(&mut state, RotationTrigger::Size)
    }

    /// Flush, fsync and release the active file. Later appends fail with
    /// [`LogError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.closed = true;
        if let Some(writer) = state.writer.take() {
            close_writer(writer)?;
        }
        Ok(())
    }

    /// Get the active file path
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Get the active file name
    pub fn active_name(&self) -> &str {
        &self.shared.active_name
    }

    /// Bytes in the active file
    pub fn current_size(&self) -> u64 {
        self.shared.state.lock().size
    }

    /// Completed rotations since the writer was opened
    pub fn rotations(&self) -> u64 {
        self.shared.state.lock().rotations
    }

    fn writer_locked<'s>(&self, state: &'s mut ActiveFile) -> Result<&'s mut BufWriter<File>> {
        if state.writer.is_none() {
            let file = open_append(&self.shared.path)?;
            state.size = file.metadata()?.len();
            state.writer = Some(BufWriter::new(file));
        }
        state.writer.as_mut().ok_or(LogError::Closed)
    }

    fn rotate_with_recovery(
        &self,
        state: &mut ActiveFile,
        trigger: RotationTrigger,
    ) -> Result<Option<PathBuf>> {
        match self.rotate_locked(state) {
            Ok(rotated) => Ok(Some(rotated)),
            Err(e) => {
                self.recover_locked(state, trigger, &e)?;
                Ok(None)
            }
        }
    }

    /// OPEN -> CLOSING -> CLOSED: flush and close the handle, rename the file
    /// to a free rotated name, then open a fresh active file.
    fn rotate_locked(&self, state: &mut ActiveFile) -> std::result::Result<PathBuf, RotationError> {
        let path = &self.shared.path;

        if let Some(writer) = state.writer.take() {
            close_writer(writer).map_err(|source| RotationError::Close {
                path: path.clone(),
                source,
            })?;
        }

        let rotated = self.rename_to_free_name()?;

        // A failed reopen is picked up by the next append
        if let Ok(file) = open_append(path) {
            state.writer = Some(BufWriter::new(file));
        }
        state.size = 0;
        state.opened_at = Instant::now();
        state.retry_after = None;
        state.rotations += 1;
        Ok(rotated)
    }

    fn rename_to_free_name(&self) -> std::result::Result<PathBuf, RotationError> {
        let path = &self.shared.path;
        let closed_at = Utc::now();

        for sequence in 0..MAX_ROTATION_ATTEMPTS {
            let name = RotatedName::new(closed_at, sequence);
            let target = path.with_file_name(name.file_name(&self.shared.active_name));

            if fs::symlink_metadata(&target).is_ok() {
                continue;
            }

            match fs::rename(path, &target) {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(RotationError::Rename {
                        from: path.clone(),
                        to: target,
                        source,
                    })
                }
            }
        }

        Err(RotationError::NamesExhausted {
            path: path.clone(),
            attempts: MAX_ROTATION_ATTEMPTS,
        })
    }

    /// Keep the sink available after a failed rotation: reopen the active file
    /// and leave a note in it.
    fn recover_locked(
        &self,
        state: &mut ActiveFile,
        trigger: RotationTrigger,
        err: &RotationError,
    ) -> Result<()> {
        state.retry_after = Some(Instant::now() + ROTATION_RETRY_BACKOFF);
        let note = format!(
            "{}  WARN logvault_logs::writer: {:?} rotation of {} failed, continuing in the current file: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            trigger,
            self.shared.path.display(),
            err
        );
        let writer = self.writer_locked(state)?;
        // Best effort: the note must not cost the record that follows
        if writer.write_all(note.as_bytes()).is_ok() && writer.flush().is_ok() {
            state.size += note.len() as u64;
        }
        Ok(())
    }
}

impl ActiveFile {
    fn rotation_allowed(&self) -> bool {
        self.retry_after.map_or(true, |t| Instant::now() >= t)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LogError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn close_writer(writer: BufWriter<File>) -> io::Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// One record's worth of output for the tracing `fmt` layer
pub struct RecordWriter<'a> {
    writer: &'a LogWriter,
}

impl Write for RecordWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = RecordWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RecordWriter { writer: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn rotated_files(dir: &Path, active: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| RotatedName::parse(active, &e.file_name().to_string_lossy()).is_some())
            .map(|e| e.path())
            .collect();
        files.sort();
        files
    }

    fn record(i: usize) -> String {
        // 100 bytes including the newline
        format!("{:<99}\n", format!("record {}", i))
    }

    #[test]
    fn test_log_writer_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("test.log");

        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();
        assert!(path.exists());
        assert_eq!(writer.active_name(), "test.log");
        assert_eq!(writer.current_size(), 0);
    }

    #[test]
    fn test_log_writer_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");
        fs::write(&path, b"earlier\n").unwrap();

        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();
        assert_eq!(writer.current_size(), 8);
        writer.append(b"later\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
        assert_eq!(writer.current_size(), 14);
    }

    #[test]
    fn test_single_rotation_at_crossing_point() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::new(Some(1024), None)).unwrap();

        let mut expected = String::new();
        for i in 0..20 {
            let line = record(i);
            if i < 10 {
                expected.push_str(&line);
            }
            writer.append(line.as_bytes()).unwrap();
        }

        let rotated = rotated_files(dir.path(), "app.log");
        assert_eq!(rotated.len(), 1);
        assert_eq!(writer.rotations(), 1);

        let rotated_content = fs::read_to_string(&rotated[0]).unwrap();
        assert_eq!(rotated_content, expected);
        assert!(rotated_content.len() <= 1024);

        let active = fs::read_to_string(&path).unwrap();
        assert_eq!(active.len(), 1000);
        assert!(active.starts_with("record 10 "));
    }

    #[test]
    fn test_never_policy_does_not_rotate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();

        for i in 0..100 {
            writer.append(record(i).as_bytes()).unwrap();
        }

        assert!(rotated_files(dir.path(), "app.log").is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 10_000);
    }

    #[test]
    fn test_rotate_if_due_by_age() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(
            path.clone(),
            RotationPolicy::new(None, Some(Duration::from_millis(50))),
        )
        .unwrap();

        // Empty files are never rotated
        thread::sleep(Duration::from_millis(60));
        assert!(writer.rotate_if_due().unwrap().is_none());

        writer.append(b"one\n").unwrap();
        assert!(writer.rotate_if_due().unwrap().is_none());

        thread::sleep(Duration::from_millis(60));
        let rotated = writer.rotate_if_due().unwrap().unwrap();
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "one\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_age_counts_from_first_record_after_idle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(
            path.clone(),
            RotationPolicy::new(None, Some(Duration::from_millis(100))),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(150));
        writer.append(b"first record after idle\n").unwrap();
        thread::sleep(Duration::from_millis(5));

        assert!(writer.rotate_if_due().unwrap().is_none());
        assert_eq!(writer.rotations(), 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "first record after idle\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_drops_handle_for_resync() {
        let full = PathBuf::from("/dev/full");
        if !full.exists() {
            return;
        }
        let writer = LogWriter::new(full, RotationPolicy::never()).unwrap();

        assert!(writer.append(b"no space left\n").is_err());
        assert_eq!(writer.current_size(), 0);
        assert!(writer.shared.state.lock().writer.is_none());

        // The next append reopens and fails the same way instead of writing blind
        assert!(writer.append(b"still no space\n").is_err());
        assert!(writer.shared.state.lock().writer.is_none());
    }

    #[test]
    fn test_collisions_take_next_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();

        for i in 0..3 {
            writer.append(format!("batch {}\n", i).as_bytes()).unwrap();
            writer.rotate().unwrap().unwrap();
        }

        let rotated = rotated_files(dir.path(), "app.log");
        assert_eq!(rotated.len(), 3);

        let mut contents: Vec<String> = rotated
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["batch 0\n", "batch 1\n", "batch 2\n"]);
    }

    #[test]
    fn test_rotate_empty_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let writer =
            LogWriter::new(dir.path().join("app.log"), RotationPolicy::never()).unwrap();
        assert!(writer.rotate().unwrap().is_none());
        assert_eq!(writer.rotations(), 0);
    }

    #[test]
    fn test_failed_rotation_keeps_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::new(Some(10), None)).unwrap();
        writer.append(b"0123456789").unwrap();

        // The rotation target cannot be created once the directory is gone
        fs::remove_dir_all(dir.path()).unwrap();
        let result = writer.append(b"next\n");

        // The record still reaches a file (recreated by the reopen) or the
        // failure is surfaced, never swallowed
        match result {
            Ok(()) => {
                let content = fs::read_to_string(&path).unwrap();
                assert!(content.ends_with("next\n"));
            }
            Err(e) => assert!(matches!(e, LogError::Open { .. } | LogError::IoError(_))),
        }
    }

    #[test]
    fn test_close_rejects_later_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();
        writer.append(b"last words\n").unwrap();
        writer.close().unwrap();

        assert!(matches!(writer.append(b"too late\n"), Err(LogError::Closed)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "last words\n");
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::new(Some(4096), None)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let line = format!("{:<63}\n", format!("thread {} line {}", t, i));
                        writer.append(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut files = rotated_files(dir.path(), "app.log");
        files.push(path);

        let mut total_lines = 0;
        for file in files {
            let content = fs::read_to_string(&file).unwrap();
            assert!(content.len() <= 4096);
            for line in content.lines() {
                assert_eq!(line.len(), 63);
                assert!(line.starts_with("thread "));
                total_lines += 1;
            }
        }
        assert_eq!(total_lines, 400);
    }

    #[test]
    fn test_make_writer_appends_whole_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::new(path.clone(), RotationPolicy::never()).unwrap();

        let mut record_writer = writer.make_writer();
        record_writer.write_all(b"via make_writer\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "via make_writer\n");
    }
}
