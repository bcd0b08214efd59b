//! JSONL output for evaluation records
//!
//! Each record is serialized in full before the file is touched, then
//! appended as one line under an exclusive advisory lock and flushed, so
//! concurrent writers (threads or processes) never interleave partial rows.

use anyhow::Context;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(50);

pub struct RecordSink {
    path: PathBuf,
    file: Mutex<File>,
}

struct SinkLock<'a> {
    file: &'a File,
}

impl Drop for SinkLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

impl RecordSink {
    /// Open `path` for appending, creating it (and its parent) if needed.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create '{}'", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open record sink '{}'", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn write<T: Serialize>(&self, record: &T) -> anyhow::Result<()> {
        let mut row = serde_json::to_string(record)?;
        row.push('\n');

        let guard = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("Record sink poisoned"))?;
        let mut file: &File = &guard;
        let _lock = lock_exclusive(file)?;
        file.write_all(row.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

fn lock_exclusive(file: &File) -> anyhow::Result<SinkLock<'_>> {
    let start = Instant::now();
    loop {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => return Ok(SinkLock { file }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() >= LOCK_TIMEOUT {
                    anyhow::bail!(
                        "Timed out waiting for record sink lock ({}s)",
                        LOCK_TIMEOUT.as_secs()
                    );
                }
                std::thread::sleep(LOCK_RETRY);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Read every well-formed record from a JSONL file. Malformed lines (for
/// example a row cut short by a crash) are skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        file: String,
        n: usize,
    }

    #[test]
    fn records_are_appended_one_per_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("results.jsonl");
        let sink = RecordSink::open(&path).unwrap();
        sink.write(&Row { file: "a".into(), n: 1 }).unwrap();
        sink.write(&Row { file: "b".into(), n: 2 }).unwrap();
        drop(sink);

        // Reopening appends rather than truncating.
        let sink = RecordSink::open(&path).unwrap();
        sink.write(&Row { file: "c".into(), n: 3 }).unwrap();

        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], Row { file: "c".into(), n: 3 });
    }

    #[test]
    fn rows_are_written_verbatim_and_flushed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results.jsonl");
        let sink = RecordSink::open(&path).unwrap();
        sink.write(&Row { file: "a".into(), n: 1 }).unwrap();
        sink.write(&Row { file: "b".into(), n: 2 }).unwrap();

        // Visible before the sink is dropped.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"file\":\"a\",\"n\":1}\n{\"file\":\"b\",\"n\":2}\n");
        let rows: Vec<Row> = read_records(sink.path()).unwrap();
        assert_eq!(
            rows,
            vec![Row { file: "a".into(), n: 1 }, Row { file: "b".into(), n: 2 }]
        );
    }

    #[test]
    fn concurrent_writers_never_interleave() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results.jsonl");
        let sink = RecordSink::open(&path).unwrap();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let sink = &sink;
                scope.spawn(move || {
                    for n in 0..25 {
                        sink.write(&Row { file: format!("t{t}"), n }).unwrap();
                    }
                });
            }
        });
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 100);
        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 100);
    }

    #[test]
    fn truncated_rows_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results.jsonl");
        std::fs::write(&path, "{\"file\":\"a\",\"n\":1}\n{\"file\":\"b\",\"n\"").unwrap();
        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows, vec![Row { file: "a".into(), n: 1 }]);
    }
}
