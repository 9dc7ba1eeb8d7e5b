//! 설정 파일 탐색/병합 로더.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::application::config::{ReplConfig, ReplConfigFile};

/// 명시 경로를 지정하는 환경변수.
pub const CONFIG_ENV: &str = "REPLPILOT_REPL_CONFIG";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ReplConfig,
    pub searched_paths: Vec<PathBuf>,
    pub loaded_paths: Vec<PathBuf>,
}

/// 기본 경로들을 순회해 병합된 설정을 만든다.
pub fn load_repl_config() -> Result<LoadedConfig> {
    load_from_paths(config_paths())
}

/// 주어진 경로를 낮은 우선순위부터 병합한다. 없는 파일은 건너뛴다.
pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<LoadedConfig> {
    let mut merged = ReplConfigFile::default();
    let mut loaded_paths = Vec::new();

    for path in &paths {
        if !path.exists() {
            continue;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let parsed: ReplConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse JSON in {}", path.display()))?;
        merged.merge_from(parsed);
        debug!(path = %path.display(), "loaded repl config");
        loaded_paths.push(path.to_path_buf());
    }

    Ok(LoadedConfig {
        config: merged.apply(ReplConfig::default()),
        searched_paths: paths,
        loaded_paths,
    })
}

/// 시스템 + 사용자 + 프로젝트 + 명시 경로 순으로 병합 경로를 구성한다.
pub fn config_paths() -> Vec<PathBuf> {
    // 낮은 우선순위 -> 높은 우선순위 순서로 병합됨.
    let mut paths = vec![PathBuf::from("/etc/replpilot/repl.json")];

    if let Some(base) = dirs::config_dir() {
        paths.push(base.join("replpilot").join("repl.json"));
    }

    paths.push(PathBuf::from(".replpilot/repl.json"));

    if let Ok(path) = env::var(CONFIG_ENV) {
        paths.push(Path::new(&path).to_path_buf());
    }

    dedup_paths(paths)
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::validation::ValidationMode;

    #[test]
    fn merges_existing_files_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let low = dir.path().join("low.json");
        let high = dir.path().join("high.json");
        let missing = dir.path().join("missing.json");
        fs::write(&low, r#"{"prompt": "low> ", "history_limit": 10}"#).unwrap();
        fs::write(&high, r#"{"prompt": "high> ", "validation_mode": "blocking"}"#).unwrap();

        let loaded = load_from_paths(vec![low.clone(), missing, high.clone()]).unwrap();
        assert_eq!(loaded.loaded_paths, vec![low, high]);
        assert_eq!(loaded.searched_paths.len(), 3);
        assert_eq!(loaded.config.prompt, "high> ");
        assert_eq!(loaded.config.history_limit, 10);
        assert_eq!(loaded.config.validation_mode, ValidationMode::Blocking);
    }

    #[test]
    fn invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();

        let err = load_from_paths(vec![bad]).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }

    #[test]
    fn no_files_yields_defaults() {
        let loaded = load_from_paths(Vec::new()).unwrap();
        assert_eq!(loaded.config, ReplConfig::default());
        assert!(loaded.loaded_paths.is_empty());
    }

    #[test]
    fn duplicate_paths_are_removed() {
        let paths = dedup_paths(vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("a")]);
        assert_eq!(paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
