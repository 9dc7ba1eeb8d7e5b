//! REPL 설정 스키마(순수 데이터).
//!
//! 주의: 파일/환경변수 접근은 `infrastructure`에서만 수행한다.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::application::completion::CompletionOptions;
use crate::application::internal_commands::{
    DEFAULT_INTERNAL_PREFIX, DEFAULT_SYSTEM_PREFIX, InternalCommandError, PrefixTable,
};
use crate::application::status_bar::StatusBarOptions;
use crate::application::validation::ValidationMode;

pub const DEFAULT_PROMPT: &str = "> ";
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 150;
pub const DEFAULT_ERROR_LOG_FILE: &str = ".replpilot-err.log";

/// 해석이 끝난 REPL 설정.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplConfig {
    pub prompt: String,
    /// None이면 내부 명령을 끈다.
    pub internal_command_prefix: Option<String>,
    /// None이면 쉘 이스케이프를 끈다.
    pub system_command_prefix: Option<String>,
    /// 쉘 이스케이프를 플랫폼 쉘로 실행할지 여부.
    pub shell: bool,
    pub history_file: Option<PathBuf>,
    pub history_limit: usize,
    pub complete_in_thread: bool,
    pub complete_while_typing: bool,
    /// 상태바 마퀴 갱신 주기.
    pub refresh_interval: Duration,
    pub validation_mode: ValidationMode,
    pub display_all_errors: bool,
    pub error_log_file: Option<PathBuf>,
    pub completion: CompletionOptions,
    pub status_bar: StatusBarOptions,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            internal_command_prefix: Some(DEFAULT_INTERNAL_PREFIX.to_string()),
            system_command_prefix: Some(DEFAULT_SYSTEM_PREFIX.to_string()),
            shell: true,
            history_file: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            complete_in_thread: true,
            complete_while_typing: true,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            validation_mode: ValidationMode::default(),
            display_all_errors: true,
            error_log_file: Some(PathBuf::from(DEFAULT_ERROR_LOG_FILE)),
            completion: CompletionOptions::default(),
            status_bar: StatusBarOptions::default(),
        }
    }
}

impl ReplConfig {
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn internal_command_prefix(mut self, prefix: Option<&str>) -> Self {
        self.internal_command_prefix = prefix.map(str::to_string);
        self
    }

    pub fn system_command_prefix(mut self, prefix: Option<&str>) -> Self {
        self.system_command_prefix = prefix.map(str::to_string);
        self
    }

    pub fn history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_file = Some(path.into());
        self
    }

    pub fn complete_in_thread(mut self, enabled: bool) -> Self {
        self.complete_in_thread = enabled;
        self
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    pub fn display_all_errors(mut self, display: bool) -> Self {
        self.display_all_errors = display;
        self
    }

    pub fn completion(mut self, options: CompletionOptions) -> Self {
        self.completion = options;
        self
    }

    pub fn status_bar(mut self, options: StatusBarOptions) -> Self {
        self.status_bar = options;
        self
    }

    /// 두 접두어를 검증해 접두어 표를 만든다.
    pub fn prefix_table(&self) -> Result<PrefixTable, InternalCommandError> {
        PrefixTable::new(
            self.internal_command_prefix.clone(),
            self.system_command_prefix.clone(),
        )
    }
}

/// 설정 파일 한 개의 내용. 모든 키는 선택이다.
///
/// 접두어 키는 세 상태를 구분한다: 키 없음(기본값 유지), `null`(기능 끔), 문자열.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReplConfigFile {
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub internal_command_prefix: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub system_command_prefix: Option<Option<String>>,
    pub shell: Option<bool>,
    pub history_file: Option<PathBuf>,
    pub history_limit: Option<usize>,
    pub complete_in_thread: Option<bool>,
    pub complete_while_typing: Option<bool>,
    pub refresh_interval_ms: Option<u64>,
    pub validation_mode: Option<ValidationMode>,
    pub display_all_errors: Option<bool>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub error_log_file: Option<Option<PathBuf>>,
    #[serde(default)]
    pub completion: CompletionConfigFile,
    #[serde(default)]
    pub status_bar: StatusBarConfigFile,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfigFile {
    pub shortest_option_names_only: Option<bool>,
    pub show_only_unused_options: Option<bool>,
    pub show_hidden_commands: Option<bool>,
    pub show_hidden_params: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StatusBarConfigFile {
    pub enabled: Option<bool>,
    pub show_hidden_commands: Option<bool>,
    pub show_hidden_params: Option<bool>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

macro_rules! take_some {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field;
            }
        )+
    };
}

impl ReplConfigFile {
    /// 후순위(나중 파일) 값으로 덮어쓰는 병합 규칙.
    pub fn merge_from(&mut self, other: ReplConfigFile) {
        take_some!(
            self,
            other,
            prompt,
            internal_command_prefix,
            system_command_prefix,
            shell,
            history_file,
            history_limit,
            complete_in_thread,
            complete_while_typing,
            refresh_interval_ms,
            validation_mode,
            display_all_errors,
            error_log_file,
        );
        self.completion.merge_from(other.completion);
        self.status_bar.merge_from(other.status_bar);
    }

    /// 파일 값을 기본 설정 위에 덮어쓴다.
    pub fn apply(self, base: ReplConfig) -> ReplConfig {
        let completion = CompletionOptions {
            shortest_option_names_only: self
                .completion
                .shortest_option_names_only
                .unwrap_or(base.completion.shortest_option_names_only),
            show_only_unused_options: self
                .completion
                .show_only_unused_options
                .unwrap_or(base.completion.show_only_unused_options),
            show_hidden_commands: self
                .completion
                .show_hidden_commands
                .unwrap_or(base.completion.show_hidden_commands),
            show_hidden_params: self
                .completion
                .show_hidden_params
                .unwrap_or(base.completion.show_hidden_params),
        };
        let status_bar = StatusBarOptions {
            enabled: self.status_bar.enabled.unwrap_or(base.status_bar.enabled),
            show_hidden_commands: self
                .status_bar
                .show_hidden_commands
                .unwrap_or(base.status_bar.show_hidden_commands),
            show_hidden_params: self
                .status_bar
                .show_hidden_params
                .unwrap_or(base.status_bar.show_hidden_params),
        };

        ReplConfig {
            prompt: self.prompt.unwrap_or(base.prompt),
            internal_command_prefix: self
                .internal_command_prefix
                .unwrap_or(base.internal_command_prefix),
            system_command_prefix: self
                .system_command_prefix
                .unwrap_or(base.system_command_prefix),
            shell: self.shell.unwrap_or(base.shell),
            history_file: self.history_file.or(base.history_file),
            history_limit: self.history_limit.unwrap_or(base.history_limit),
            complete_in_thread: self.complete_in_thread.unwrap_or(base.complete_in_thread),
            complete_while_typing: self
                .complete_while_typing
                .unwrap_or(base.complete_while_typing),
            refresh_interval: self
                .refresh_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.refresh_interval),
            validation_mode: self.validation_mode.unwrap_or(base.validation_mode),
            display_all_errors: self.display_all_errors.unwrap_or(base.display_all_errors),
            error_log_file: self.error_log_file.unwrap_or(base.error_log_file),
            completion,
            status_bar,
        }
    }
}

impl CompletionConfigFile {
    pub fn merge_from(&mut self, other: CompletionConfigFile) {
        take_some!(
            self,
            other,
            shortest_option_names_only,
            show_only_unused_options,
            show_hidden_commands,
            show_hidden_params,
        );
    }
}

impl StatusBarConfigFile {
    pub fn merge_from(&mut self, other: StatusBarConfigFile) {
        take_some!(self, other, enabled, show_hidden_commands, show_hidden_params);
    }
}
