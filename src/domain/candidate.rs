//! 완성 후보와 사용자 정의 완성 훅 타입.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::tokenizer::before_cursor;
use crate::domain::tree::Parameter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Group,
    Command,
    Option,
    /// boolean 플래그. 값은 플래그가 켜는 값이다.
    BoolFlag(bool),
    Value,
    File,
    Directory,
    Internal,
    Error,
}

/// 화면에 제시되는 완성 후보 하나.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 실제로 삽입되는 텍스트.
    pub text: String,
    pub display: String,
    pub help: Option<String>,
    /// 커서 기준 치환 시작 위치(문자 단위, 0 이하).
    pub start: isize,
    pub kind: CandidateKind,
}

impl Candidate {
    /// 공백이 있는 삽입 텍스트는 큰따옴표로 감싼다.
    pub fn new(text: impl Into<String>, start: isize, kind: CandidateKind) -> Self {
        let text = quote_if_spaced(text.into());
        Self {
            display: text.clone(),
            text,
            help: None,
            start,
            kind,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn with_help(mut self, help: Option<impl Into<String>>) -> Self {
        self.help = help.map(Into::into).filter(|h: &String| !h.is_empty());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            text: String::new(),
            display: message.clone(),
            help: Some(message),
            start: 0,
            kind: CandidateKind::Error,
        }
    }

    /// 후보를 `line`의 `cursor`(바이트) 위치에 적용하고 새 줄과 커서를 돌려준다.
    /// 문자 중간을 가리키는 커서는 그 문자의 시작으로 당긴다.
    pub fn apply(&self, line: &str, cursor: usize) -> (String, usize) {
        let cursor = before_cursor(line, cursor).len();
        let back = self.start.unsigned_abs();
        let replace_from = line[..cursor]
            .char_indices()
            .rev()
            .nth(back.saturating_sub(1))
            .map(|(idx, _)| if back == 0 { cursor } else { idx })
            .unwrap_or(if back == 0 { cursor } else { 0 });

        let mut out = String::with_capacity(line.len() + self.text.len());
        out.push_str(&line[..replace_from]);
        out.push_str(&self.text);
        let new_cursor = out.len();
        out.push_str(&line[cursor..]);
        (out, new_cursor)
    }
}

fn quote_if_spaced(text: String) -> String {
    let already_quoted = text.starts_with('"') || text.ends_with('"');
    if text.contains(' ') && !already_quoted {
        format!("\"{}\"", text.replace('"', "\\\""))
    } else {
        text
    }
}

/// 완성 훅이 돌려주는 값.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub value: String,
    pub help: Option<String>,
}

impl CompletionItem {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl From<&str> for CompletionItem {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CompletionItem {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 훅 호출 시 넘기는 입력 문맥.
#[derive(Debug)]
pub struct HookRequest<'a> {
    pub param: &'a Parameter,
    /// 이미 입력이 끝난 토큰들.
    pub args: &'a [String],
    /// 입력 중인 값(따옴표가 풀린 형태).
    pub incomplete: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
    #[error("completion hook panicked: {0}")]
    Panicked(String),
}

type HookFn = dyn Fn(&HookRequest<'_>) -> Result<Vec<CompletionItem>, HookError> + Send + Sync;

/// 파라미터에 붙는 사용자 정의 완성 함수.
#[derive(Clone)]
pub struct CompletionHook(Arc<HookFn>);

impl CompletionHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&HookRequest<'_>) -> Result<Vec<CompletionItem>, HookError> + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    /// 고정 목록을 접두어로 거르는 훅.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        Self::new(move |request| {
            Ok(values
                .iter()
                .filter(|v| v.starts_with(request.incomplete))
                .map(|v| CompletionItem::new(v.clone()))
                .collect())
        })
    }

    /// 훅을 호출한다. 패닉도 `HookError`로 바꿔 호출자에게 전파하지 않는다.
    pub fn call(&self, request: &HookRequest<'_>) -> Result<Vec<CompletionItem>, HookError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.0)(request))) {
            Ok(result) => result,
            Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionHook(..)")
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_typed_prefix() {
        let c = Candidate::new("get-marks", -7, CandidateKind::Command);
        let (line, cursor) = c.apply("get-mar", 7);
        assert_eq!(line, "get-marks");
        assert_eq!(cursor, 9);
    }

    #[test]
    fn apply_pulls_cursor_back_to_char_start() {
        let c = Candidate::new("학생들", -2, CandidateKind::Value);
        // 1은 '학'의 중간 바이트다.
        let (line, cursor) = c.apply("학생 x", 1);
        assert_eq!(line, "학생들학생 x");
        assert_eq!(cursor, "학생들".len());

        let (line, cursor) = c.apply("학생", 4);
        assert_eq!(line, "학생들생");
        assert_eq!(cursor, "학생들".len());
    }

    #[test]
    fn apply_keeps_text_after_cursor() {
        let c = Candidate::new("--name", -2, CandidateKind::Option);
        let (line, cursor) = c.apply("run --  tail", 6);
        assert_eq!(line, "run --name  tail");
        assert_eq!(cursor, 10);
    }

    #[test]
    fn apply_with_zero_anchor_appends() {
        let c = Candidate::new("math", 0, CandidateKind::Value);
        assert_eq!(c.apply("set ", 4).0, "set math");
    }

    #[test]
    fn spaced_text_is_quoted() {
        let c = Candidate::new("my \"file\" name", 0, CandidateKind::Value);
        assert_eq!(c.text, "\"my \\\"file\\\" name\"");
    }

    #[test]
    fn hook_panic_becomes_error() {
        let hook = CompletionHook::new(|_| panic!("exploded"));
        let param = Parameter::argument("x");
        let err = hook
            .call(&HookRequest {
                param: &param,
                args: &[],
                incomplete: "",
            })
            .unwrap_err();
        assert_eq!(err, HookError::Panicked("exploded".to_string()));
    }
}
