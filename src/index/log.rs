//! Append-only JSONL index: the write-ahead record of every quarantine move,
//! restore, and maintenance run.
//!
//! Each line is a self-contained JSON object assembled in memory and written
//! with a single `write_all`, so a tailing reader never observes interleaved
//! partial lines. Existing lines are never rewritten, reordered, or removed.
//!
//! Reading is lazy and tolerant: a line that is not valid UTF-8, not valid
//! JSON, or not a known record shape is skipped, and reading continues with
//! the next line. A torn final line (crash mid-append) is therefore harmless.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{Result, RkError};
use crate::index::entry::LogEntry;

/// Handle to an index file on disk.
#[derive(Debug, Clone)]
pub struct IndexLog {
    path: PathBuf,
    fsync_on_append: bool,
}

impl IndexLog {
    /// Index at `path`, syncing every appended line to disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync_on_append: true,
        }
    }

    /// Toggle `sync_data` after each append.
    #[must_use]
    pub fn with_fsync(mut self, fsync_on_append: bool) -> Self {
        self.fsync_on_append = fsync_on_append;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as one line, creating the file and its parent
    /// directories if absent.
    ///
    /// If the previous writer died mid-line, a newline is written first so the
    /// new record starts on a line of its own.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        self.reject_directory()?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = open_append(&self.path)?;
        if !ends_with_newline(&mut file).map_err(|e| RkError::io(&self.path, e))? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .map_err(|e| RkError::io(&self.path, e))?;
        if self.fsync_on_append {
            file.sync_data().map_err(|e| RkError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Lazily iterate over every parseable entry.
    ///
    /// A missing index reads as empty. Each call reopens the file, so the
    /// sequence can be restarted by calling this again.
    pub fn read_all(&self) -> Result<Entries> {
        self.reject_directory()?;
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::with_capacity(64 * 1024, file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(RkError::io(&self.path, e)),
        };
        Ok(Entries {
            reader,
            path: self.path.clone(),
            buf: Vec::new(),
            skipped: 0,
        })
    }
}

impl IndexLog {
    fn reject_directory(&self) -> Result<()> {
        if self.path.is_dir() {
            return Err(RkError::Index {
                path: self.path.clone(),
                details: "index path is a directory".to_string(),
            });
        }
        Ok(())
    }
}

/// Lazy, finite iterator over the parseable lines of an index.
pub struct Entries {
    reader: Option<BufReader<File>>,
    path: PathBuf,
    buf: Vec<u8>,
    skipped: usize,
}

impl Entries {
    /// Number of lines skipped so far because they failed to parse.
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Entries {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[RK-INDEX] read stopped at {}: {e}", self.path.display());
                    self.reader = None;
                    return None;
                }
            }

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<LogEntry>(line) {
                Ok(entry) => return Some(entry),
                Err(_) => self.skipped += 1,
            }
        }
    }
}

/// Open or create a file for appending, creating parent directories.
fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| RkError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|source| RkError::io(path, source))
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::entry::{CleanupRecord, STATUS_SUCCESS};

    fn cleanup(batch: &str, name: &str, time: i64) -> LogEntry {
        LogEntry::Cleanup(CleanupRecord {
            status: STATUS_SUCCESS.to_string(),
            batch_id: batch.to_string(),
            scope: "test".to_string(),
            source_path: PathBuf::from(format!("/src/{name}")),
            recycle_path: PathBuf::from(format!("/recycle/{batch}/{name}")),
            size_bytes: 10,
            time,
            error: None,
            error_type: None,
        })
    }

    #[test]
    fn append_creates_parent_dirs_and_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/index.jsonl");
        let log = IndexLog::new(&path);

        log.append(&cleanup("b1", "a", 1)).unwrap();
        log.append(&cleanup("b1", "b", 2)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["action"], "cleanup");
        }
    }

    #[test]
    fn append_never_rewrites_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        fs::write(&path, "{\"legacy\":true}\n").unwrap();

        IndexLog::new(&path)
            .with_fsync(false)
            .append(&cleanup("b1", "a", 1))
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\"legacy\":true}\n"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn append_after_torn_line_starts_fresh_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        fs::write(&path, "{\"action\":\"cleanup\",\"sta").unwrap();

        let log = IndexLog::new(&path);
        log.append(&cleanup("b1", "a", 1)).unwrap();

        let entries: Vec<LogEntry> = log.read_all().unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time(), 1);
    }

    #[test]
    fn read_skips_corrupt_lines_and_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let good = serde_json::to_string(&cleanup("b1", "a", 7)).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(b"not json at all\n");
        raw.extend_from_slice(good.as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(&[0xff, 0xfe, b'\n']);
        raw.extend_from_slice(b"\n{\"action\":\"unknown\",\"time\":1}\n");
        raw.extend_from_slice(good.as_bytes());
        fs::write(&path, raw).unwrap();

        let mut entries = IndexLog::new(&path).read_all().unwrap();
        let parsed: Vec<LogEntry> = entries.by_ref().collect();
        assert_eq!(parsed.len(), 2, "both good lines survive, incl. unterminated tail");
        assert_eq!(entries.skipped(), 3);
    }

    #[test]
    fn missing_index_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = IndexLog::new(dir.path().join("absent.jsonl"));
        assert_eq!(log.read_all().unwrap().count(), 0);
        assert!(!log.path().exists(), "reading must not create the index");
    }

    #[test]
    fn directory_as_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = IndexLog::new(dir.path());
        assert_eq!(log.read_all().err().map(|e| e.code()), Some("RK-2001"));
        assert_eq!(
            log.append(&cleanup("b1", "a", 1)).err().map(|e| e.code()),
            Some("RK-2001")
        );
    }

    #[test]
    fn read_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let log = IndexLog::new(dir.path().join("index.jsonl"));
        for i in 0..3 {
            log.append(&cleanup("b", &format!("f{i}"), i)).unwrap();
        }
        let first: Vec<LogEntry> = log.read_all().unwrap().collect();
        let second: Vec<LogEntry> = log.read_all().unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
