//! Buffered JSONL file sink.
//!
//! Entries are serialized on `write` and held in memory until the buffer
//! fills or `flush` is called; `flush` appends them and syncs the file to
//! disk. Each instance writes its own file:
//!
//! ```text
//! logs/
//! └── raw/
//!     ├── 2026-01-21_checkout.jsonl      # active
//!     ├── 2026-01-21_checkout.1.jsonl    # previous generation
//!     └── 2026-01-21_checkout.2.jsonl
//! ```
//!
//! When a flush would push the active file past `max_file_bytes`, the file
//! is first rotated to `.1` and older generations shift up, so the newest
//! entries always land in the active file. The first flush on a new local
//! day switches to that day's file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::FileSinkConfig;
use crate::entry::{LogEntry, WireEntry};
use crate::error::SinkError;

use super::Sink;

/// Pending lines kept while the file is unwritable, as a multiple of
/// `buffer_entries`. Oldest lines are dropped beyond this.
const BACKLOG_FACTOR: usize = 20;

struct FileState {
    file: Option<File>,
    /// Active file, named after `date`
    path: PathBuf,
    date: NaiveDate,
    buffer: Vec<String>,
    /// Bytes in the active file
    written: u64,
}

/// Appends serialized entries to `raw/<date>_<instance>.jsonl`.
pub struct FileSink {
    config: FileSinkConfig,
    state: Mutex<FileState>,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn dated_path(config: &FileSinkConfig, date: NaiveDate) -> PathBuf {
    let filename = format!("{}_{}.jsonl", date.format("%Y-%m-%d"), config.instance);
    config.logs_dir.join("raw").join(filename)
}

fn generation_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.jsonl", stem, n))
}

fn open(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append target that can cut a torn tail back off.
trait AppendTarget: Write {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

impl AppendTarget for File {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Write `chunk` at the end of a target holding `written` bytes. On failure
/// the target is cut back to `written`, so a retry never follows a fragment.
fn append_chunk<W: AppendTarget>(target: &mut W, written: u64, chunk: &[u8]) -> std::io::Result<()> {
    if let Err(e) = target.write_all(chunk) {
        if let Err(cut) = target.truncate_to(written) {
            warn!(error = %cut, "Could not remove partial write from log file");
        }
        return Err(e);
    }
    Ok(())
}

impl FileSink {
    /// Create the sink. No I/O happens until [`Sink::initialize`].
    pub fn new(config: FileSinkConfig) -> Self {
        let date = today();
        let path = dated_path(&config, date);

        Self {
            config,
            state: Mutex::new(FileState {
                file: None,
                path,
                date,
                buffer: Vec::new(),
                written: 0,
            }),
        }
    }

    /// Path to the active JSONL file.
    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Entries written but not yet flushed.
    pub fn pending(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Path of rotated generation `n` (1 = most recent) of the active file.
    pub fn rotated_path(&self, n: usize) -> PathBuf {
        generation_path(&self.state.lock().path, n)
    }

    fn flush_locked(&self, state: &mut FileState) -> Result<(), SinkError> {
        self.flush_locked_on(state, today())
    }

    fn flush_locked_on(&self, state: &mut FileState, today: NaiveDate) -> Result<(), SinkError> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        if state.file.is_none() {
            return Err(SinkError::Closed);
        }
        if today != state.date {
            self.start_day_locked(state, today)?;
        }

        let mut chunk = String::with_capacity(state.buffer.iter().map(|l| l.len() + 1).sum());
        for line in &state.buffer {
            chunk.push_str(line);
            chunk.push('\n');
        }

        if state.written > 0 && state.written + chunk.len() as u64 > self.config.max_file_bytes {
            self.rotate_locked(state)?;
        }

        let written = state.written;
        let file = state.file.as_mut().ok_or(SinkError::Closed)?;
        append_chunk(file, written, chunk.as_bytes())?;
        file.sync_data()?;
        state.written += chunk.len() as u64;
        state.buffer.clear();
        Ok(())
    }

    /// Switch to the file named after `date`.
    fn start_day_locked(&self, state: &mut FileState, date: NaiveDate) -> Result<(), SinkError> {
        state.file = None;
        state.path = dated_path(&self.config, date);
        state.date = date;

        let file = open(&state.path)?;
        state.written = file.metadata()?.len();
        state.file = Some(file);
        debug!(path = %state.path.display(), "Started new daily log file");
        Ok(())
    }

    fn rotate_locked(&self, state: &mut FileState) -> Result<(), SinkError> {
        state.file = None;
        let shifted = self.shift_generations(&state.path);

        // Reopen even if shifting failed so later flushes still have a file.
        let file = open(&state.path)?;
        state.written = file.metadata()?.len();
        state.file = Some(file);

        shifted?;
        debug!(path = %state.path.display(), "Rotated log file");
        Ok(())
    }

    fn shift_generations(&self, path: &Path) -> std::io::Result<()> {
        let keep = self.config.max_files.max(1);
        let oldest = generation_path(path, keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..keep).rev() {
            let from = generation_path(path, n);
            if from.exists() {
                fs::rename(&from, generation_path(path, n + 1))?;
            }
        }
        fs::rename(path, generation_path(path, 1))
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn initialize(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if let Some(parent) = state.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open(&state.path)?;
        let written = file.metadata()?.len();

        state.file = Some(file);
        state.written = written;
        Ok(())
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = entry.to_json_line()?;

        let mut state = self.state.lock();
        state.buffer.push(line);

        let backlog = self.config.buffer_entries.max(1) * BACKLOG_FACTOR;
        if state.buffer.len() > backlog {
            let excess = state.buffer.len() - backlog;
            state.buffer.drain(..excess);
            warn!(dropped = excess, "File sink backlog full, dropped oldest entries");
        }

        if state.buffer.len() >= self.config.buffer_entries {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn dispose(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let result = self.flush_locked(&mut state);
        state.file = None;
        result
    }

    fn supports_durable_flush(&self) -> bool {
        true
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.file.is_some() {
            let _ = self.flush_locked(&mut state);
        }
    }
}

/// Read every JSONL file under `logs_dir/raw`, sorted by timestamp.
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_all_entries(logs_dir: impl AsRef<Path>) -> std::io::Result<Vec<WireEntry>> {
    let raw_dir = logs_dir.as_ref().join("raw");

    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();

    for entry in fs::read_dir(&raw_dir)? {
        let path = entry?.path();

        if path.extension().map(|e| e == "jsonl").unwrap_or(false) {
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match WireEntry::from_json_line(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unparseable log line");
                    }
                }
            }
        }
    }

    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use tempfile::TempDir;

    fn config(dir: &TempDir, buffer_entries: usize) -> FileSinkConfig {
        FileSinkConfig {
            buffer_entries,
            ..FileSinkConfig::new(dir.path().join("logs"), "app")
        }
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path)
            .map(|c| c.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn test_initialize_creates_directory_structure() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 10));
        sink.initialize().unwrap();

        assert!(temp.path().join("logs").join("raw").exists());
        assert!(sink.path().exists());
        assert!(sink.path().to_string_lossy().ends_with("_app.jsonl"));
    }

    #[test]
    fn test_writes_are_buffered_until_flush() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 10));
        sink.initialize().unwrap();

        sink.write(&LogEntry::new(LogLevel::Info, "First message")).unwrap();
        sink.write(&LogEntry::new(LogLevel::Debug, "Second message")).unwrap();
        assert_eq!(sink.pending(), 2);
        assert_eq!(line_count(&sink.path()), 0);

        sink.flush().unwrap();
        assert_eq!(sink.pending(), 0);

        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("First message"));
        assert!(lines[1].contains("Second message"));
    }

    #[test]
    fn test_full_buffer_flushes_automatically() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 3));
        sink.initialize().unwrap();

        for i in 0..3 {
            sink.write(&LogEntry::new(LogLevel::Info, format!("m{}", i))).unwrap();
        }
        assert_eq!(sink.pending(), 0);
        assert_eq!(line_count(&sink.path()), 3);
    }

    #[test]
    fn test_write_before_initialize_is_reported_on_flush() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 1));
        let err = sink.write(&LogEntry::new(LogLevel::Info, "early")).unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[test]
    fn test_rotation_keeps_newest_in_active_file() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(FileSinkConfig {
            buffer_entries: 1,
            max_file_bytes: 200,
            max_files: 2,
            ..FileSinkConfig::new(temp.path().join("logs"), "rot")
        });
        sink.initialize().unwrap();

        for i in 0..10 {
            sink.write(&LogEntry::new(LogLevel::Info, format!("entry-{}", i))).unwrap();
        }
        sink.write(&LogEntry::new(LogLevel::Info, "newest")).unwrap();

        assert!(sink.rotated_path(1).exists());
        assert!(!sink.rotated_path(3).exists());

        let active = fs::read_to_string(sink.path()).unwrap();
        assert!(active.contains("newest"));
    }

    #[test]
    fn test_read_all_entries_sorted() {
        let temp = TempDir::new().unwrap();
        let logs_dir = temp.path().join("logs");

        let app = FileSink::new(FileSinkConfig::new(&logs_dir, "app"));
        let worker = FileSink::new(FileSinkConfig::new(&logs_dir, "worker"));
        app.initialize().unwrap();
        worker.initialize().unwrap();

        app.write(&LogEntry::new(LogLevel::Info, "App started")).unwrap();
        worker.write(&LogEntry::new(LogLevel::Warn, "Worker started")).unwrap();
        app.flush().unwrap();
        worker.flush().unwrap();

        let entries = read_all_entries(&logs_dir).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp <= entries[1].timestamp);
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"App started"));
        assert!(messages.contains(&"Worker started"));
    }

    /// Accepts `capacity` bytes in total, then fails mid-write.
    struct ShortWriter {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let room = self.capacity.saturating_sub(self.data.len());
            if room == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for ShortWriter {
        fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_leaves_no_torn_line() {
        let mut target = ShortWriter {
            data: b"{\"a\":1}\n".to_vec(),
            capacity: 12,
        };
        let chunk = b"{\"b\":2}\n{\"c\":3}\n";

        assert!(append_chunk(&mut target, 8, chunk).is_err());
        assert_eq!(target.data, b"{\"a\":1}\n");

        // Retrying the same lines once space frees up yields whole lines only.
        target.capacity = 64;
        append_chunk(&mut target, 8, chunk).unwrap();
        let text = String::from_utf8(target.data).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"]);
    }

    #[test]
    fn test_failed_flush_keeps_buffer_for_retry() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 10));
        sink.initialize().unwrap();
        sink.write(&LogEntry::new(LogLevel::Info, "kept")).unwrap();

        sink.state.lock().file = None;
        assert!(sink.flush().is_err());
        assert_eq!(sink.pending(), 1);
    }

    #[test]
    fn test_new_day_switches_file() {
        let temp = TempDir::new().unwrap();
        let sink = FileSink::new(config(&temp, 10));
        sink.initialize().unwrap();
        let first_day = sink.path();

        sink.write(&LogEntry::new(LogLevel::Info, "today")).unwrap();
        sink.flush().unwrap();

        let tomorrow = today().succ_opt().unwrap();
        sink.write(&LogEntry::new(LogLevel::Info, "tomorrow")).unwrap();
        {
            let mut state = sink.state.lock();
            sink.flush_locked_on(&mut state, tomorrow).unwrap();
        }

        let second_day = sink.path();
        assert_ne!(first_day, second_day);
        assert!(second_day
            .to_string_lossy()
            .ends_with(&format!("{}_app.jsonl", tomorrow.format("%Y-%m-%d"))));
        assert!(fs::read_to_string(&first_day).unwrap().contains("\"today\""));
        let second = fs::read_to_string(&second_day).unwrap();
        assert!(second.contains("\"tomorrow\""));
        assert!(!second.contains("\"today\""));
    }
}
