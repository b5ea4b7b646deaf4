//! JSON-lines file with size-based rotation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use logroller::{LogRoller, LogRollerBuilder, Rotation, RotationSize};

use super::{Sink, SinkError};
use crate::record::LogRecord;

pub const FILE_NAME: &str = "history.log";

/// `<dir>/history.log`, rolled once it reaches `max_bytes`, keeping at
/// most `backups` rotated files.
pub struct RotatingFileSink {
    path: PathBuf,
    roller: Mutex<LogRoller>,
}

impl RotatingFileSink {
    pub fn open(dir: impl AsRef<Path>, max_bytes: u64, backups: usize) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let roller = LogRollerBuilder::new(dir, Path::new(FILE_NAME))
            .rotation(Rotation::SizeBased(RotationSize::Bytes(max_bytes.max(1))))
            .max_keep_files(backups as u64)
            .build()
            .map_err(|e| std::io::Error::other(format!("failed to open rotating log file: {e}")))?;

        Ok(Self {
            path: dir.join(FILE_NAME),
            roller: Mutex::new(roller),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for RotatingFileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&record.to_json())?;
        line.push(b'\n');

        let mut roller = self.roller.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        roller.write_all(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut roller = self.roller.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        roller.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample;
    use std::fs;

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.file_name().is_some_and(|n| n.to_string_lossy().starts_with(FILE_NAME)))
            .collect();
        files.sort();
        files
    }

    fn all_lines(dir: &Path) -> Vec<serde_json::Value> {
        log_files(dir)
            .iter()
            .flat_map(|p| {
                fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RotatingFileSink::open(dir.path(), 1024 * 1024, 3).unwrap();
        sink.write(&sample()).unwrap();
        sink.flush().unwrap();

        let lines = all_lines(dir.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "hello");
        assert_eq!(lines[0]["requestId"], "rid-r1");
    }

    #[test]
    fn rotates_and_keeps_bounded_backups() {
        let dir = tempfile::tempdir().unwrap();
        // Every line is larger than the limit, so each write rolls the file.
        let sink = RotatingFileSink::open(dir.path(), 64, 2).unwrap();
        for _ in 0..6 {
            sink.write(&sample()).unwrap();
        }
        sink.flush().unwrap();

        let files = log_files(dir.path());
        assert!(files.len() >= 2, "expected rotation, got {files:?}");
        assert!(files.len() <= 3, "expected at most two backups, got {files:?}");
    }

    #[test]
    fn reopening_keeps_earlier_lines() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let sink = RotatingFileSink::open(dir.path(), 1 << 20, 1).unwrap();
            sink.write(&sample()).unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(all_lines(dir.path()).len(), 2);
    }
}
