//! 키 입력마다 줄을 다시 해석해 사용법 오류를 표시하는 검증기.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::internal_commands::PrefixTable;
use crate::application::ports::ErrorSink;
use crate::domain::parser::{ParseError, ParseState};
use crate::domain::tokenizer::before_cursor;
use crate::domain::tree::CommandTree;

/// 잘못된 입력을 제출할 수 있는지 여부.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// 표시만 하고 제출은 허용한다.
    #[default]
    Advisory,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid { message: String },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid { message } => Some(message),
        }
    }
}

/// 표시하지 않고 호출자에게 넘기는 일반 오류.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ValidationFailure {
    pub kind: String,
    pub message: String,
}

pub struct Validator {
    tree: Arc<CommandTree>,
    group_path: Vec<String>,
    prefixes: PrefixTable,
    display_all_errors: bool,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl Validator {
    pub fn new(tree: Arc<CommandTree>, prefixes: PrefixTable) -> Self {
        Self {
            tree,
            group_path: Vec::new(),
            prefixes,
            display_all_errors: true,
            sink: None,
        }
    }

    pub fn with_group_path(mut self, group_path: Vec<String>) -> Self {
        self.group_path = group_path;
        self
    }

    pub fn display_all_errors(mut self, display: bool) -> Self {
        self.display_all_errors = display;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 커서 앞 텍스트를 검증한다. 접두어가 붙은 줄은 검사하지 않는다.
    pub fn validate(&self, line: &str, cursor: usize) -> Result<Validation, ValidationFailure> {
        let text = before_cursor(line, cursor);
        if self.prefixes.classify(text).is_some() {
            return Ok(Validation::Valid);
        }
        let state = ParseState::parse_at(&self.tree, &self.group_path, text);
        self.validate_parsed(text, &state)
    }

    /// 이미 해석한 상태로 검증한다.
    /// `state`는 `text`를 같은 트리와 그룹 경로에서 해석한 결과여야 한다.
    pub fn validate_parsed(&self, text: &str, state: &ParseState<'_>) -> Result<Validation, ValidationFailure> {
        if self.prefixes.classify(text).is_some() {
            return Ok(Validation::Valid);
        }
        let Some(err) = state.error() else {
            return Ok(Validation::Valid);
        };
        debug!(%err, kind = err.kind(), "input failed validation");

        if err.is_usage() {
            return Ok(invalid(err.to_string()));
        }
        if !err.is_generic() {
            return Ok(invalid(format!("{}: {err}", err.kind())));
        }
        if self.display_all_errors {
            return Ok(invalid(format!("{}: {err}", err.kind())));
        }

        Err(self.report(err))
    }

    fn report(&self, err: &ParseError) -> ValidationFailure {
        let failure = ValidationFailure {
            kind: err.kind().to_string(),
            message: err.to_string(),
        };
        error!(kind = %failure.kind, message = %failure.message, "generic error during validation");
        if let Some(sink) = &self.sink
            && let Err(log_err) = sink.record(&failure.kind, &failure.message, &[])
        {
            warn!(error = %log_err, "failed to write error log");
        }
        failure
    }
}

fn invalid(message: String) -> Validation {
    Validation::Invalid { message }
}
