//! 현재 그룹/명령과 파라미터 사용 상태를 요약하는 하단 상태바.

use serde::{Deserialize, Serialize};

use crate::application::marquee::Marquee;
use crate::domain::param_type::ParamType;
use crate::domain::parser::ParseState;
use crate::domain::styled::{Role, StyledSpan, UsageState};
use crate::domain::tree::{Nargs, Parameter, normalize_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBarOptions {
    pub enabled: bool,
    pub show_hidden_commands: bool,
    pub show_hidden_params: bool,
}

impl Default for StatusBarOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            show_hidden_commands: false,
            show_hidden_params: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusBar {
    options: StatusBarOptions,
    content: Option<Marquee>,
}

impl StatusBar {
    pub fn new(options: StatusBarOptions) -> Self {
        Self {
            options,
            content: None,
        }
    }

    pub fn options(&self) -> &StatusBarOptions {
        &self.options
    }

    /// 해석 결과로 내용을 갱신한다. 내용이 같으면 스크롤 위치를 유지하고 false.
    pub fn update(&mut self, state: &ParseState<'_>) -> bool {
        if !self.options.enabled {
            return false;
        }
        let next = self.describe(state);
        let unchanged = match (&self.content, &next) {
            (Some(current), Some((prefix, text))) => current.prefix() == prefix.as_slice() && current.text() == text.as_slice(),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.content = next.map(|(prefix, text)| Marquee::new(prefix, text));
        true
    }

    /// 내용을 오류 한 줄로 바꾼다.
    pub fn display_error(&mut self, kind: &str, message: &str) {
        self.content = Some(Marquee::new(
            Vec::new(),
            vec![
                StyledSpan::new(Role::Error, kind),
                StyledSpan::new(Role::Error, ": "),
                StyledSpan::new(Role::Error, message),
            ],
        ));
    }

    pub fn reset(&mut self) {
        self.content = None;
    }

    pub fn tick(&mut self, width: usize) {
        if let Some(content) = &mut self.content {
            content.tick(width);
        }
    }

    pub fn render(&self, width: usize) -> Vec<StyledSpan> {
        match &self.content {
            Some(content) if self.options.enabled => content.frame(width),
            _ => Vec::new(),
        }
    }

    fn describe(&self, state: &ParseState<'_>) -> Option<(Vec<StyledSpan>, Vec<StyledSpan>)> {
        match state.command() {
            None => Some(self.describe_group(state)),
            Some(command) if command.hidden && !self.options.show_hidden_commands => None,
            Some(command) => {
                let mut prefix = vec![
                    StyledSpan::new(Role::Prefix, "Command"),
                    StyledSpan::new(Role::Plain, " "),
                    StyledSpan::new(Role::CommandName, command.name.clone()),
                ];
                let mut text: Vec<StyledSpan> = Vec::new();
                for (index, param) in command.params.iter().enumerate() {
                    if param.hidden && !self.options.show_hidden_params {
                        continue;
                    }
                    if !text.is_empty() {
                        text.push(StyledSpan::new(Role::Plain, " "));
                    }
                    text.extend(param_spans(state, index, param));
                }
                if !text.is_empty() {
                    prefix.push(StyledSpan::new(Role::Punctuation, ":"));
                    prefix.push(StyledSpan::new(Role::Plain, " "));
                }
                Some((prefix, text))
            }
        }
    }

    fn describe_group(&self, state: &ParseState<'_>) -> (Vec<StyledSpan>, Vec<StyledSpan>) {
        let group = state.group();
        let mut prefix = vec![
            StyledSpan::new(Role::Prefix, "Group"),
            StyledSpan::new(Role::Plain, " "),
            StyledSpan::new(Role::GroupName, group.name.clone()),
        ];
        if group
            .visible_children(self.options.show_hidden_commands)
            .next()
            .is_none()
        {
            return (prefix, Vec::new());
        }
        prefix.push(StyledSpan::new(Role::Punctuation, ":"));
        prefix.push(StyledSpan::new(Role::Plain, " "));
        let text = vec![
            StyledSpan::new(Role::Metavar, "COMMAND"),
            StyledSpan::new(Role::Plain, " "),
            StyledSpan::new(Role::Punctuation, "["),
            StyledSpan::new(Role::Metavar, "ARGS"),
            StyledSpan::new(Role::Punctuation, "]"),
            StyledSpan::new(Role::Punctuation, "..."),
        ];
        (prefix, text)
    }
}

fn usage_state(state: &ParseState<'_>, index: usize, param: &Parameter) -> UsageState {
    if param.repeatable() {
        return UsageState::Unused;
    }
    if state.current_param().is_some_and(|c| c.index == index) {
        UsageState::Current
    } else if !state.is_param_incomplete(index) {
        UsageState::Used
    } else {
        UsageState::Unused
    }
}

/// 파라미터 하나의 표기. 현재 파라미터만 타입과 개수 정보를 붙인다.
fn param_spans(state: &ParseState<'_>, index: usize, param: &Parameter) -> Vec<StyledSpan> {
    let usage = usage_state(state, index, param);
    let mut out = vec![StyledSpan::new(Role::Param(usage), normalize_name(&param.name))];

    let Some(current) = state.current_param().filter(|c| c.index == index) else {
        return out;
    };
    let received = current.received;
    let type_usage = if state.is_param_incomplete(index) {
        UsageState::Current
    } else {
        UsageState::Used
    };

    if let ParamType::Tuple(types) = &param.ty {
        out.push(StyledSpan::new(Role::Punctuation, "("));
        for (i, ty) in types.iter().enumerate() {
            if i > 0 {
                out.push(StyledSpan::new(Role::Plain, " "));
            }
            let element_usage = match i.cmp(&received) {
                std::cmp::Ordering::Less => UsageState::Used,
                std::cmp::Ordering::Equal => UsageState::Current,
                std::cmp::Ordering::Greater => UsageState::Unused,
            };
            let mut spans = type_spans(ty, element_usage);
            if spans.is_empty() {
                spans = bracketed("text".to_string(), element_usage);
            }
            out.extend(spans);
        }
        out.push(StyledSpan::new(Role::Punctuation, ")"));
        return out;
    }

    let mut info = type_spans(&param.ty, type_usage);
    match param.nargs {
        Nargs::Fixed(n) if n > 1 => {
            info.push(StyledSpan::new(Role::Param(usage), format!("({received}/{n})")));
        }
        Nargs::Unbounded => {
            if !info.is_empty() {
                info.push(StyledSpan::new(Role::Plain, " "));
            }
            info.push(StyledSpan::new(Role::Param(usage), "..."));
        }
        Nargs::Fixed(_) => {}
    }
    if !info.is_empty() {
        out.push(StyledSpan::new(Role::Plain, " "));
        out.extend(info);
    }
    out
}

fn type_spans(ty: &ParamType, usage: UsageState) -> Vec<StyledSpan> {
    if ty.is_textual() {
        return Vec::new();
    }
    let label = match (ty, ty.describe_range()) {
        (ParamType::IntRange { .. }, Some(range)) => format!("integer {range}"),
        (ParamType::FloatRange { .. }, Some(range)) => format!("float {range}"),
        _ => ty.name().to_string(),
    };
    bracketed(label, usage)
}

fn bracketed(label: String, usage: UsageState) -> Vec<StyledSpan> {
    vec![
        StyledSpan::new(Role::Punctuation, "<"),
        StyledSpan::new(Role::ParamType(usage), label),
        StyledSpan::new(Role::Punctuation, ">"),
    ]
}
