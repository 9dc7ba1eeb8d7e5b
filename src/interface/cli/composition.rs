//! 애플리케이션 조립(composition root) 모듈.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::application::config::ReplConfig;
use crate::application::ports::{ErrorSink, History, SystemShell};
use crate::application::session::{InMemoryHistory, Repl};
use crate::infrastructure::clap_tree::ClapDispatcher;
use crate::infrastructure::config::{LoadedConfig, load_repl_config};
use crate::infrastructure::error_log::FileErrorLog;
use crate::infrastructure::history::FileHistory;
use crate::infrastructure::shell::ProcessShell;
use crate::interface::cli::command::school_dispatcher;

/// 실행 시점 의존성을 한 곳에서 조립하는 컨테이너.
pub struct AppComposition {
    config: ReplConfig,
    loaded_paths: Vec<PathBuf>,
}

impl AppComposition {
    /// 기본 경로에서 설정을 읽어 조합을 만든다.
    pub fn load() -> Result<Self> {
        let LoadedConfig {
            config,
            loaded_paths,
            ..
        } = load_repl_config()?;
        debug!(files = loaded_paths.len(), "loaded REPL config");
        Ok(Self {
            config,
            loaded_paths,
        })
    }

    /// 이미 해석된 설정으로 조합을 만든다.
    pub fn from_config(config: ReplConfig) -> Self {
        Self {
            config,
            loaded_paths: Vec::new(),
        }
    }

    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    pub fn loaded_paths(&self) -> &[PathBuf] {
        &self.loaded_paths
    }

    pub fn dispatcher(&self) -> Result<ClapDispatcher> {
        school_dispatcher()
    }

    pub fn shell(&self) -> Arc<dyn SystemShell> {
        Arc::new(ProcessShell::new(self.config.shell))
    }

    /// 이력 파일을 열지 못하면 메모리 이력으로 대신한다.
    pub fn history(&self) -> Box<dyn History> {
        let Some(path) = &self.config.history_file else {
            return Box::new(InMemoryHistory::new());
        };
        match FileHistory::open(path, self.config.history_limit) {
            Ok(history) => Box::new(history),
            Err(err) => {
                warn!(path = %path.display(), "history unavailable: {err:#}");
                Box::new(InMemoryHistory::new())
            }
        }
    }

    pub fn error_sink(&self) -> Option<Arc<dyn ErrorSink>> {
        self.config
            .error_log_file
            .as_ref()
            .map(|path| Arc::new(FileErrorLog::new(path)) as Arc<dyn ErrorSink>)
    }

    /// 설정을 반영한 최상위 REPL을 만든다.
    pub fn repl(&self) -> Result<Repl<ClapDispatcher>> {
        let mut repl = Repl::new(self.dispatcher()?, self.config.clone(), self.shell())?
            .with_history(self.history());
        if let Some(sink) = self.error_sink() {
            repl = repl.with_error_sink(sink);
        }
        Ok(repl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn history_falls_back_to_memory_without_file() {
        let config = ReplConfig {
            history_file: None,
            ..ReplConfig::default()
        };
        let composition = AppComposition::from_config(config);
        assert!(composition.history().entries().is_empty());
        assert!(composition.loaded_paths().is_empty());
    }

    #[test]
    fn history_reads_configured_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history");
        std::fs::write(&path, "get-marks alice\nclass list\n").unwrap();
        let config = ReplConfig::default().history_file(&path);
        let composition = AppComposition::from_config(config);
        assert_eq!(
            composition.history().entries(),
            ["get-marks alice".to_string(), "class list".to_string()]
        );
    }

    #[test]
    fn error_sink_follows_config() {
        let config = ReplConfig {
            error_log_file: None,
            ..ReplConfig::default()
        };
        assert!(AppComposition::from_config(config).error_sink().is_none());
        assert!(
            AppComposition::from_config(ReplConfig::default())
                .error_sink()
                .is_some()
        );
    }

    #[test]
    fn repl_starts_at_root_level() {
        let repl = AppComposition::from_config(ReplConfig::default())
            .repl()
            .unwrap();
        assert_eq!(repl.depth(), 1);
        assert_eq!(repl.current().map(|s| s.prompt()), Some("> "));
    }

    #[test]
    fn bad_prefixes_fail_construction() {
        let config = ReplConfig::default()
            .internal_command_prefix(Some("!"))
            .system_command_prefix(Some("!"));
        assert!(AppComposition::from_config(config).repl().is_err());
    }
}
