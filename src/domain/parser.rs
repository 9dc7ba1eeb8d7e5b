//! 입력 중인 명령 줄을 명령 트리에 대입해 ParseState를 만든다.
//! 키 입력마다 새로 만들어지고 버려지며, 실패는 에러 표식으로만 남긴다.

use std::fmt;
use std::ptr;

use thiserror::Error;
use tracing::debug;

use crate::domain::tokenizer::{RawToken, Span, expand_value, tokenize};
use crate::domain::tree::{CommandTree, Command, Group, Node, Parameter};

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// 파싱 중 발견된 오류. 세션을 끝내지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("No such command '{name}'.{}", did_you_mean(.suggestion))]
    UnknownCommand {
        name: String,
        suggestion: Option<String>,
    },
    #[error("No such option: {name}{}", did_you_mean(.suggestion))]
    UnknownOption {
        name: String,
        suggestion: Option<String>,
    },
    #[error("Option '{name}' is ambiguous, possible options: {}", .candidates.join(", "))]
    AmbiguousOption {
        name: String,
        candidates: Vec<String>,
    },
    #[error("Option '{name}' does not take a value.")]
    UnexpectedOptionValue { name: String },
    #[error("Got unexpected extra argument ({value})")]
    UnexpectedArgument { value: String },
    #[error("Invalid value for '{param}': {message}")]
    InvalidValue { param: String, message: String },
    /// 사용자 검사 훅의 패닉처럼 사용법과 무관한 오류.
    #[error("{0}")]
    Internal(String),
}

impl ParseError {
    /// 메시지만 보여주면 되는 사용법 오류인지 여부.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::UnknownCommand { .. }
                | Self::UnknownOption { .. }
                | Self::UnexpectedOptionValue { .. }
                | Self::UnexpectedArgument { .. }
        )
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. }
            | Self::UnknownOption { .. }
            | Self::UnexpectedOptionValue { .. }
            | Self::UnexpectedArgument { .. } => "UsageError",
            Self::AmbiguousOption { .. } => "BadOptionUsage",
            Self::InvalidValue { .. } => "BadParameter",
            Self::Internal(_) => "Error",
        }
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" Did you mean '{s}'?"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Group,
    Command,
    Option,
    OptionValue,
    Argument,
    DoubleDash,
}

/// 분류가 끝난 토큰.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    /// 대응하는 파라미터 인덱스(현재 명령 기준).
    pub param: Option<usize>,
}

/// 아직 입력 중인 마지막 토큰.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Incomplete {
    /// 따옴표를 포함한 원문.
    pub raw: String,
    /// 따옴표를 푼 값.
    pub text: String,
    pub span: Span,
}

impl Incomplete {
    fn empty(at: usize) -> Self {
        Self {
            raw: String::new(),
            text: String::new(),
            span: Span::new(at, at),
        }
    }

    fn from_token(token: RawToken) -> Self {
        Self {
            raw: token.raw,
            text: token.text,
            span: token.span,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// 후보 치환 시작 위치(커서 기준 음수 문자 수).
    pub fn anchor(&self) -> isize {
        -(self.raw.chars().count() as isize)
    }

    /// `~`와 환경 변수를 펼친 값.
    pub fn expanded(&self) -> String {
        expand_value(&self.text)
    }
}

/// 값을 받는 중인 파라미터.
#[derive(Debug, Clone, Copy)]
pub struct CurrentParam<'t> {
    pub param: &'t Parameter,
    pub index: usize,
    /// 이번 사용에서 이미 받은 값 개수.
    pub received: usize,
}

impl CurrentParam<'_> {
    pub fn required(&self) -> Option<usize> {
        self.param.required_values()
    }
}

impl PartialEq for CurrentParam<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.param, other.param)
            && self.index == other.index
            && self.received == other.received
    }
}

/// 값이 공급된 파라미터와 그 값.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValues {
    pub index: usize,
    pub values: Vec<String>,
    pub occurrences: usize,
}

/// 한 줄을 해석한 결과.
#[derive(Debug, Clone)]
pub struct ParseState<'t> {
    tree: &'t CommandTree,
    groups: Vec<&'t Group>,
    command: Option<&'t Command>,
    current: Option<CurrentParam<'t>>,
    supplied: Vec<ParamValues>,
    tokens: Vec<Token>,
    args: Vec<String>,
    incomplete: Incomplete,
    double_dash: bool,
    error: Option<ParseError>,
}

impl<'t> ParseState<'t> {
    /// 줄 전체(커서 앞 텍스트)를 루트 그룹 기준으로 해석한다. 실패하지 않는다.
    pub fn parse(tree: &'t CommandTree, line: &str) -> Self {
        Self::parse_at(tree, &[], line)
    }

    /// 중첩 REPL처럼 하위 그룹에서 시작하는 해석.
    /// 경로에 없는 이름이 있으면 그 지점까지만 내려간다.
    pub fn parse_at(tree: &'t CommandTree, group_path: &[String], line: &str) -> Self {
        let tokenized = tokenize(line);
        let mut complete = tokenized.complete;
        let mut incomplete = match tokenized.incomplete {
            Some(token) => Incomplete::from_token(token),
            None => Incomplete::empty(line.len()),
        };

        if let Some((flag, value)) = split_attached_value(&incomplete) {
            complete.push(flag);
            incomplete = value;
        }

        let mut walker = Walker::new(tree);
        walker.descend(group_path);
        for token in &complete {
            if !walker.step(token) {
                break;
            }
        }

        let state = walker.finish(incomplete);
        debug!(state = %state, error = ?state.error, "parsed input line");
        state
    }

    pub fn tree(&self) -> &'t CommandTree {
        self.tree
    }

    /// 가장 안쪽의 그룹.
    pub fn group(&self) -> &'t Group {
        self.groups
            .last()
            .copied()
            .unwrap_or_else(|| self.tree.root())
    }

    /// 루트부터 현재 그룹까지의 경로.
    pub fn groups(&self) -> &[&'t Group] {
        &self.groups
    }

    pub fn command(&self) -> Option<&'t Command> {
        self.command
    }

    pub fn current_param(&self) -> Option<&CurrentParam<'t>> {
        self.current.as_ref()
    }

    pub fn supplied(&self) -> &[ParamValues] {
        &self.supplied
    }

    pub fn values_of(&self, index: usize) -> Option<&ParamValues> {
        self.supplied.iter().find(|v| v.index == index)
    }

    pub fn is_supplied(&self, index: usize) -> bool {
        self.values_of(index).is_some()
    }

    /// 파라미터가 아직 값을 다 받지 못했는지 여부.
    pub fn is_param_incomplete(&self, index: usize) -> bool {
        if self
            .current
            .is_some_and(|c| c.index == index && c.param.is_option())
        {
            return true;
        }
        let Some(command) = self.command else {
            return true;
        };
        let Some(param) = command.params.get(index) else {
            return true;
        };
        let Some(supplied) = self.values_of(index) else {
            return true;
        };
        match param.required_values() {
            Some(0) => false,
            Some(n) => supplied.values.len() < n,
            None => supplied.values.is_empty(),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// 입력이 끝난 토큰 값 목록.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn incomplete(&self) -> &Incomplete {
        &self.incomplete
    }

    pub fn double_dash(&self) -> bool {
        self.double_dash
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 루트 아래 그룹 이름 경로.
    pub fn group_path(&self) -> Vec<String> {
        self.groups
            .iter()
            .skip(1)
            .map(|g| g.name.clone())
            .collect()
    }
}

impl PartialEq for ParseState<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.tree, other.tree)
            && self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(&other.groups)
                .all(|(a, b)| ptr::eq(*a, *b))
            && match (self.command, other.command) {
                (Some(a), Some(b)) => ptr::eq(a, b),
                (None, None) => true,
                _ => false,
            }
            && self.current == other.current
            && self.supplied == other.supplied
            && self.tokens == other.tokens
            && self.incomplete == other.incomplete
            && self.double_dash == other.double_dash
            && self.error == other.error
    }
}

impl fmt::Display for ParseState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.group().name)?;
        if let Some(command) = self.command {
            write!(f, " > {}", command.name)?;
        }
        if let Some(current) = &self.current {
            if self.command.is_none() {
                write!(f, " > None")?;
            }
            write!(f, " > {}", current.param.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    index: usize,
    received: usize,
}

struct Walker<'t> {
    tree: &'t CommandTree,
    groups: Vec<&'t Group>,
    command: Option<&'t Command>,
    supplied: Vec<ParamValues>,
    tokens: Vec<Token>,
    args: Vec<String>,
    pending: Option<Pending>,
    double_dash: bool,
    error: Option<ParseError>,
}

impl<'t> Walker<'t> {
    fn new(tree: &'t CommandTree) -> Self {
        Self {
            tree,
            groups: vec![tree.root()],
            command: None,
            supplied: Vec::new(),
            tokens: Vec::new(),
            args: Vec::new(),
            pending: None,
            double_dash: false,
            error: None,
        }
    }

    fn descend(&mut self, group_path: &[String]) {
        for name in group_path {
            let group = self.groups.last().copied().unwrap_or_else(|| self.tree.root());
            match group.child(name) {
                Some(Node::Group(child)) => self.groups.push(child),
                _ => break,
            }
        }
    }

    /// 토큰 하나를 처리한다. 오류가 나면 false를 돌려 이후 토큰을 멈춘다.
    fn step(&mut self, token: &RawToken) -> bool {
        self.args.push(token.text.clone());
        match self.command {
            None => self.step_node(token),
            Some(command) => self.step_param(command, token),
        }
    }

    fn step_node(&mut self, token: &RawToken) -> bool {
        let group = self.groups.last().copied().unwrap_or_else(|| self.tree.root());

        if token.text.len() > 1 && token.text.starts_with('-') {
            return self.fail(ParseError::UnknownOption {
                name: token.text.clone(),
                suggestion: None,
            });
        }

        match group.child(&token.text) {
            Some(Node::Group(child)) => {
                self.groups.push(child);
                self.push_token(TokenKind::Group, token, None);
                true
            }
            Some(Node::Command(command)) => {
                self.command = Some(command);
                self.push_token(TokenKind::Command, token, None);
                true
            }
            None => {
                let names = group
                    .visible_children(false)
                    .map(|child| child.name().to_string())
                    .collect::<Vec<_>>();
                self.fail(ParseError::UnknownCommand {
                    name: token.text.clone(),
                    suggestion: suggest(&token.text, names.iter().map(String::as_str)),
                })
            }
        }
    }

    fn step_param(&mut self, command: &'t Command, token: &RawToken) -> bool {
        if let Some(pending) = self.pending.take() {
            let param = &command.params[pending.index];
            self.push_token(TokenKind::OptionValue, token, Some(pending.index));
            if !self.accept_value(pending.index, param, pending.received, &token.text) {
                return false;
            }
            let received = pending.received + 1;
            let still_open = match param.required_values() {
                Some(n) => received < n,
                None => true,
            };
            if still_open {
                self.pending = Some(Pending {
                    index: pending.index,
                    received,
                });
            }
            return true;
        }

        if !self.double_dash && token.text == "--" {
            self.double_dash = true;
            self.push_token(TokenKind::DoubleDash, token, None);
            return true;
        }

        if !self.double_dash && is_option_like(&token.text, command) {
            return self.step_option(command, token);
        }

        self.step_argument(command, token)
    }

    fn step_option(&mut self, command: &'t Command, token: &RawToken) -> bool {
        let text = token.text.as_str();

        if text.starts_with("--") {
            let (name, attached) = match text.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (text, None),
            };
            let (index, flag) = match resolve_long(command, name) {
                Ok(resolved) => resolved,
                Err(err) => return self.fail(err),
            };
            self.push_token(TokenKind::Option, token, Some(index));
            return self.open_option(command, index, &flag, attached);
        }

        if let Some((index, _)) = command.option_by_flag(text) {
            self.push_token(TokenKind::Option, token, Some(index));
            return self.open_option(command, index, text, None);
        }

        // 짧은 플래그 묶음(`-vx`, `-n5`).
        self.push_token(TokenKind::Option, token, None);
        let body = &text[1..];
        for (offset, ch) in body.char_indices() {
            let flag = format!("-{ch}");
            let Some((index, param)) = command.option_by_flag(&flag) else {
                let flags = all_flags(command);
                return self.fail(ParseError::UnknownOption {
                    suggestion: suggest(&flag, flags.iter().map(String::as_str)),
                    name: flag,
                });
            };
            if param.takes_value() {
                let rest = &body[offset + ch.len_utf8()..];
                let attached = (!rest.is_empty()).then_some(rest);
                return self.open_option(command, index, &flag, attached);
            }
            if !self.open_option(command, index, &flag, None) {
                return false;
            }
        }
        true
    }

    fn open_option(
        &mut self,
        command: &'t Command,
        index: usize,
        flag: &str,
        attached: Option<&str>,
    ) -> bool {
        let param = &command.params[index];
        self.record_occurrence(index, param);

        if !param.takes_value() {
            if attached.is_some() {
                return self.fail(ParseError::UnexpectedOptionValue {
                    name: flag.to_string(),
                });
            }
            if param.is_flag {
                let on = !param.secondary().iter().any(|f| f == flag);
                self.push_value(index, on.to_string());
            }
            return true;
        }

        match attached {
            Some(value) => {
                if !self.accept_value(index, param, 0, value) {
                    return false;
                }
                let more = match param.required_values() {
                    Some(n) => n > 1,
                    None => true,
                };
                if more {
                    self.pending = Some(Pending { index, received: 1 });
                }
            }
            None => self.pending = Some(Pending { index, received: 0 }),
        }
        true
    }

    fn step_argument(&mut self, command: &'t Command, token: &RawToken) -> bool {
        let Some((index, param, received)) = self.next_argument(command) else {
            return self.fail(ParseError::UnexpectedArgument {
                value: token.text.clone(),
            });
        };
        self.push_token(TokenKind::Argument, token, Some(index));
        if received == 0 && self.values_of(index).is_none() {
            self.record_occurrence(index, param);
        }
        self.accept_value(index, param, received, &token.text)
    }

    /// 아직 값을 더 받을 수 있는 첫 위치 인자.
    fn next_argument(&self, command: &'t Command) -> Option<(usize, &'t Parameter, usize)> {
        command.arguments().find_map(|(index, param)| {
            let received = self.values_of(index).map(|v| v.values.len()).unwrap_or(0);
            match param.required_values() {
                Some(n) if received < n => Some((index, param, received)),
                Some(_) => None,
                None => Some((index, param, received)),
            }
        })
    }

    fn accept_value(&mut self, index: usize, param: &Parameter, position: usize, value: &str) -> bool {
        match param.check_value(position, value) {
            Ok(Ok(())) => {
                self.push_value(index, value.to_string());
                true
            }
            Ok(Err(message)) => self.fail(ParseError::InvalidValue {
                param: param_label(param),
                message,
            }),
            Err(panic) => self.fail(ParseError::Internal(panic.to_string())),
        }
    }

    fn record_occurrence(&mut self, index: usize, param: &Parameter) {
        match self.supplied.iter_mut().find(|v| v.index == index) {
            Some(entry) => {
                entry.occurrences += 1;
                if !param.repeatable() {
                    entry.values.clear();
                }
            }
            None => self.supplied.push(ParamValues {
                index,
                values: Vec::new(),
                occurrences: 1,
            }),
        }
    }

    fn push_value(&mut self, index: usize, value: String) {
        if let Some(entry) = self.supplied.iter_mut().find(|v| v.index == index) {
            entry.values.push(value);
        }
    }

    fn values_of(&self, index: usize) -> Option<&ParamValues> {
        self.supplied.iter().find(|v| v.index == index)
    }

    fn push_token(&mut self, kind: TokenKind, token: &RawToken, param: Option<usize>) {
        self.tokens.push(Token {
            kind,
            text: token.text.clone(),
            span: token.span,
            param,
        });
    }

    fn fail(&mut self, error: ParseError) -> bool {
        debug!(%error, "parse stopped");
        self.error = Some(error);
        self.pending = None;
        false
    }

    fn finish(self, incomplete: Incomplete) -> ParseState<'t> {
        let current = match (self.command, &self.error) {
            (Some(command), None) => {
                if let Some(pending) = self.pending {
                    Some(CurrentParam {
                        param: &command.params[pending.index],
                        index: pending.index,
                        received: pending.received,
                    })
                } else if !self.double_dash && is_option_like(&incomplete.text, command) {
                    None
                } else {
                    self.next_argument(command)
                        .map(|(index, param, received)| CurrentParam {
                            param,
                            index,
                            received,
                        })
                }
            }
            _ => None,
        };

        ParseState {
            tree: self.tree,
            groups: self.groups,
            command: self.command,
            current,
            supplied: self.supplied,
            tokens: self.tokens,
            args: self.args,
            incomplete,
            double_dash: self.double_dash,
            error: self.error,
        }
    }
}

/// 긴 옵션을 정확한 이름, 그다음 유일한 접두어로 찾는다.
fn resolve_long(command: &Command, name: &str) -> Result<(usize, String), ParseError> {
    if let Some((index, _)) = command.option_by_flag(name) {
        return Ok((index, name.to_string()));
    }

    let mut matches: Vec<(usize, &String)> = Vec::new();
    for (index, param) in command.params.iter().enumerate() {
        if !param.is_option() {
            continue;
        }
        for flag in param.all_flags() {
            if flag.starts_with("--") && flag.starts_with(name) {
                matches.push((index, flag));
            }
        }
    }

    match matches.as_slice() {
        [] => {
            let flags = all_flags(command);
            Err(ParseError::UnknownOption {
                name: name.to_string(),
                suggestion: suggest(name, flags.iter().map(String::as_str)),
            })
        }
        [(index, flag)] => Ok((*index, (*flag).clone())),
        _ => Err(ParseError::AmbiguousOption {
            name: name.to_string(),
            candidates: matches.iter().map(|(_, flag)| (*flag).clone()).collect(),
        }),
    }
}

fn all_flags(command: &Command) -> Vec<String> {
    command
        .params
        .iter()
        .filter(|p| p.is_option() && !p.hidden)
        .flat_map(|p| p.all_flags().cloned())
        .collect()
}

/// `-`로 시작하는 토큰을 옵션으로 볼지 판단한다. 음수는 위치 인자로 본다.
fn is_option_like(text: &str, command: &Command) -> bool {
    if text.len() < 2 || !text.starts_with('-') {
        return false;
    }
    let numeric = text.parse::<f64>().is_ok();
    !numeric || command.option_by_flag(text).is_some()
}

/// 에러 메시지에 쓰는 파라미터 표기.
pub fn param_label(param: &Parameter) -> String {
    if let Some(long) = param.flags().iter().find(|f| f.starts_with("--")) {
        return long.clone();
    }
    if let Some(first) = param.flags().first() {
        return first.clone();
    }
    param
        .metavar
        .clone()
        .unwrap_or_else(|| param.display_name().to_uppercase())
}

/// 가장 가까운 이름을 제안한다.
pub fn suggest<'a>(typed: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .map(|candidate| (strsim::jaro_winkler(typed, candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// 입력 중 토큰의 `--opt=value`를 옵션 토큰과 입력 중 값으로 나눈다.
fn split_attached_value(incomplete: &Incomplete) -> Option<(RawToken, Incomplete)> {
    let (flag, value) = incomplete.text.split_once('=')?;
    if !is_flag_shape(flag) {
        return None;
    }
    let raw_eq = incomplete.raw.find('=')?;
    let flag_end = incomplete.span.start + raw_eq;

    let token = RawToken {
        text: flag.to_string(),
        raw: incomplete.raw[..raw_eq].to_string(),
        span: Span::new(incomplete.span.start, flag_end),
        unterminated: false,
    };
    let value = Incomplete {
        raw: incomplete.raw[raw_eq + 1..].to_string(),
        text: value.to_string(),
        span: Span::new(flag_end + 1, incomplete.span.end),
    };
    Some((token, value))
}

fn is_flag_shape(flag: &str) -> bool {
    let body = flag
        .strip_prefix("--")
        .or_else(|| flag.strip_prefix('-'))
        .unwrap_or("");
    let mut chars = body.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
