//! 프런트엔드가 키 입력마다 호출하는 완성/검증/상태바 묶음.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::completion::{CompletionBatch, CompletionWorker, Completer};
use crate::application::status_bar::StatusBar;
use crate::application::validation::{Validation, ValidationFailure, ValidationMode, Validator};
use crate::domain::candidate::{Candidate, CandidateKind};
use crate::domain::styled::StyledSpan;
use crate::domain::tokenizer::before_cursor;

const HOOK_ERROR_KIND: &str = "CompletionError";

pub struct LineAssist {
    completer: Arc<Completer>,
    validator: Validator,
    status: StatusBar,
    pub complete_in_thread: bool,
    pub complete_while_typing: bool,
    pub refresh_interval: Duration,
    pub validation_mode: ValidationMode,
}

impl LineAssist {
    pub fn new(completer: Completer, validator: Validator, status: StatusBar) -> Self {
        Self {
            completer: Arc::new(completer),
            validator,
            status,
            complete_in_thread: false,
            complete_while_typing: true,
            refresh_interval: Duration::from_millis(150),
            validation_mode: ValidationMode::default(),
        }
    }

    pub fn completer(&self) -> &Arc<Completer> {
        &self.completer
    }

    /// 작업 스레드 완성을 쓰도록 설정된 경우에만 워커를 만든다.
    pub fn spawn_worker(&self) -> Option<(CompletionWorker, mpsc::UnboundedReceiver<CompletionBatch>)> {
        self.complete_in_thread
            .then(|| CompletionWorker::new(Arc::clone(&self.completer)))
    }

    /// 현재 스레드에서 후보를 모두 계산한다.
    pub fn complete(&mut self, line: &str, cursor: usize) -> Vec<Candidate> {
        let candidates = self
            .completer
            .collect(line, cursor, &CancellationToken::new())
            .unwrap_or_default();
        self.absorb(&candidates);
        candidates
    }

    /// 작업 스레드에서 온 결과의 훅 오류를 상태바에 반영한다.
    pub fn absorb(&mut self, candidates: &[Candidate]) {
        if let Some(err) = candidates.iter().find(|c| c.kind == CandidateKind::Error) {
            self.status.display_error(HOOK_ERROR_KIND, &err.display);
        }
    }

    /// 입력이 바뀔 때마다 상태바를 갱신하고 검증한다.
    pub fn observe(&mut self, line: &str, cursor: usize) -> Result<Validation, ValidationFailure> {
        let state = self.completer.parse(line, cursor);
        self.status.update(&state);
        self.validator.validate_parsed(before_cursor(line, cursor), &state)
    }

    pub fn blocks_submission(&self, validation: &Validation) -> bool {
        self.validation_mode == ValidationMode::Blocking && !validation.is_valid()
    }

    pub fn tick(&mut self, width: usize) {
        self.status.tick(width);
    }

    pub fn status_line(&self, width: usize) -> Vec<StyledSpan> {
        self.status.render(width)
    }
}

/// 한 번의 줄 읽기에 필요한 프롬프트 문맥.
pub struct PromptFrame<'a> {
    pub prompt: &'a str,
    /// 오래된 것부터의 입력 이력.
    pub history: &'a [String],
    pub assist: LineAssist,
}

impl<'a> PromptFrame<'a> {
    pub fn new(prompt: &'a str, history: &'a [String], assist: LineAssist) -> Self {
        Self {
            prompt,
            history,
            assist,
        }
    }
}
