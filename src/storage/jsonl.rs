//! Append-only newline-delimited JSON files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::WriterError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WriterError + '_ {
    move |source| WriterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Advisory exclusive lock held for the lifetime of the guard
struct ExclusiveLock<'a> {
    file: &'a File,
}

impl<'a> ExclusiveLock<'a> {
    #[cfg(unix)]
    fn acquire(file: &'a File) -> std::io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file`, which outlives the guard
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    fn acquire(file: &'a File) -> std::io::Result<Self> {
        Ok(Self { file })
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: see `acquire`
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

/// Appends one JSON line per record to `path`, then flushes and fsyncs.
///
/// Parent directories are created on demand. The write happens under an
/// exclusive `flock` which is released on every exit path. Blocking; call
/// it from `spawn_blocking` inside async code. Returns the bytes written.
pub fn append_records<T: Serialize>(path: &Path, records: &[T]) -> Result<usize, WriterError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut buf = Vec::with_capacity(records.len() * 256);
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(path))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;

    let _lock = ExclusiveLock::acquire(&file).map_err(io_err(path))?;
    (&file).write_all(&buf).map_err(io_err(path))?;
    (&file).flush().map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))?;

    Ok(buf.len())
}

/// [`append_records`] on the blocking pool
pub async fn append_records_blocking<T>(path: PathBuf, records: Vec<T>) -> Result<usize, WriterError>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || append_records(&path, &records)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_append_creates_and_extends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/2024-01-01.jsonl");

        append_records(&path, &[json!({"n": 1}), json!({"n": 2})]).unwrap();
        append_records(&path, &[json!({"n": 3})]).unwrap();
        assert_eq!(append_records::<Value>(&path, &[]).unwrap(), 0);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes the open fail
        let path = dir.path().join("blocked.jsonl");
        fs::create_dir_all(&path).unwrap();
        let err = append_records(&path, &[json!({"n": 1})]).unwrap_err();
        assert!(matches!(err, WriterError::Io { .. }));

        let ok = dir.path().join("ok.jsonl");
        append_records(&ok, &[json!({"n": 1})]).unwrap();
        append_records(&ok, &[json!({"n": 2})]).unwrap();
        assert_eq!(fs::read_to_string(&ok).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");

        std::thread::scope(|s| {
            for t in 0..4 {
                let path = &path;
                s.spawn(move || {
                    for i in 0..25 {
                        let batch: Vec<Value> =
                            (0..10).map(|j| json!({"t": t, "i": i, "j": j, "pad": "x".repeat(64)})).collect();
                        append_records(path, &batch).unwrap();
                    }
                });
            }
        });

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4 * 25 * 10);
        // every batch of ten is contiguous
        for chunk in lines.chunks(10) {
            assert!(chunk.iter().all(|v| v["t"] == chunk[0]["t"] && v["i"] == chunk[0]["i"]));
        }
    }
}
