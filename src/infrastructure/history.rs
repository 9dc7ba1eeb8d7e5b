//! 파일 기반 입력 이력.
//!
//! 한 줄에 한 항목, 추가만 한다. 파일을 다시 쓰지 않는다.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::History;

#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
    limit: usize,
    entries: Vec<String>,
}

impl FileHistory {
    /// 기존 파일이 있으면 최근 `limit`개 항목만 메모리에 올린다.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Result<Self> {
        let path = path.into();
        let mut entries = Vec::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read history at {}", path.display()))?;
            entries = raw
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
        }
        let mut history = Self {
            path,
            limit,
            entries,
        };
        history.truncate();
        Ok(history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }
}

impl History for FileHistory {
    fn entries(&self) -> &[String] {
        &self.entries
    }

    fn append(&mut self, line: &str) -> Result<()> {
        // 여러 줄 항목은 지원하지 않는다.
        let entry = line.replace(['\r', '\n'], " ");

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history at {}", self.path.display()))?;
        writeln!(file, "{entry}")
            .with_context(|| format!("failed to write history at {}", self.path.display()))?;

        self.entries.push(entry);
        self.truncate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_without_dedup_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history");

        let mut history = FileHistory::open(&path, 100).unwrap();
        history.append("get-marks").unwrap();
        history.append("get-marks").unwrap();
        history.append("multi\nline").unwrap();

        let reloaded = FileHistory::open(&path, 100).unwrap();
        assert_eq!(reloaded.entries(), ["get-marks", "get-marks", "multi line"]);
    }

    #[test]
    fn limit_bounds_memory_not_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        fs::write(&path, "a\nb\nc\n").unwrap();

        let mut history = FileHistory::open(&path, 2).unwrap();
        assert_eq!(history.entries(), ["b", "c"]);
        history.append("d").unwrap();
        assert_eq!(history.entries(), ["c", "d"]);

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "a\nb\nc\nd\n");
    }
}
