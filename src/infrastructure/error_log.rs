//! 일반 오류를 파일에 덧붙여 남기는 기록기. 회전은 하지 않는다.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;

use crate::application::ports::ErrorSink;

#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<timestamp> ERROR <kind>: <message>` 뒤에 원인 목록을 붙인 한 블록.
pub fn format_entry(timestamp: &str, kind: &str, message: &str, causes: &[String]) -> String {
    let mut block = format!("{timestamp} ERROR {kind}: {message}\n");
    for cause in causes {
        block.push_str(&format!("  caused by: {cause}\n"));
    }
    block
}

impl ErrorSink for FileErrorLog {
    fn record(&self, kind: &str, message: &str, causes: &[String]) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let block = format_entry(&timestamp, kind, message, causes);

        // 포이즌 상태여도 기록은 계속한다.
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open error log at {}", self.path.display()))?;
        file.write_all(block.as_bytes())
            .with_context(|| format!("failed to write error log at {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_lists_causes() {
        let block = format_entry(
            "2024-01-01 00:00:00.000",
            "CheckPanic",
            "value check panicked: boom",
            &["inner".to_string()],
        );
        assert_eq!(
            block,
            "2024-01-01 00:00:00.000 ERROR CheckPanic: value check panicked: boom\n  caused by: inner\n"
        );
    }

    #[test]
    fn records_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileErrorLog::new(dir.path().join("err.log"));
        log.record("A", "first", &[]).unwrap();
        log.record("B", "second", &[]).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ERROR A: first"));
        assert!(lines[1].ends_with("ERROR B: second"));
    }
}
