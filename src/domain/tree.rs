//! 명령 트리 모델.
//! 루트 그룹 아래로 하위 그룹/명령이 매달리고, 명령은 파라미터 목록을 가진다.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::candidate::{CompletionHook, panic_message};
use crate::domain::param_type::ParamType;

/// 트리 구성 단계에서 거부되는 구조 오류.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("duplicate name '{name}' in group '{group}'")]
    DuplicateName { group: String, name: String },
    #[error("duplicate parameter '{name}' in command '{command}'")]
    DuplicateParam { command: String, name: String },
    #[error(
        "unbounded argument '{name}' in command '{command}' must be the last argument"
    )]
    ArgumentPosition { command: String, name: String },
    #[error("option '{name}' in command '{command}' has no flags")]
    MissingFlags { command: String, name: String },
}

/// `get_marks`와 `get-marks`를 같은 이름으로 취급한다.
pub fn normalize_name(name: &str) -> String {
    name.replace('_', "-")
}

pub fn names_match(declared: &str, typed: &str) -> bool {
    declared == typed || normalize_name(declared) == normalize_name(typed)
}

/// 파라미터 값 개수.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nargs {
    Fixed(usize),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Option {
        flags: Vec<String>,
        /// boolean 토글의 off 플래그(`--no-color` 등).
        secondary_flags: Vec<String>,
    },
    Argument,
}

/// 명령 작성자가 붙이는 값 검사 훅. 패닉은 에러 문자열로 바뀐다.
#[derive(Clone)]
pub struct ValueCheck(Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>);

/// 값 검사 훅이 패닉으로 끝난 경우.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value check panicked: {0}")]
pub struct CheckPanic(pub String);

impl ValueCheck {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    pub fn run(&self, value: &str) -> Result<Result<(), String>, CheckPanic> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.0)(value)))
            .map_err(|payload| CheckPanic(panic_message(payload.as_ref())))
    }
}

impl fmt::Debug for ValueCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueCheck(..)")
    }
}

/// 명령의 옵션 또는 위치 인자.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub nargs: Nargs,
    pub ty: ParamType,
    pub required: bool,
    pub hidden: bool,
    pub multiple: bool,
    pub is_flag: bool,
    pub count: bool,
    pub help: Option<String>,
    pub metavar: Option<String>,
    pub completer: Option<CompletionHook>,
    pub value_check: Option<ValueCheck>,
}

impl Parameter {
    /// 값을 하나 받는 옵션.
    pub fn option<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ParamKind::Option {
                flags: flags.into_iter().map(Into::into).collect(),
                secondary_flags: Vec::new(),
            },
            nargs: Nargs::Fixed(1),
            ty: ParamType::String,
            required: false,
            hidden: false,
            multiple: false,
            is_flag: false,
            count: false,
            help: None,
            metavar: None,
            completer: None,
            value_check: None,
        }
    }

    /// 값 없이 켜고 끄는 boolean 플래그.
    pub fn flag<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut param = Self::option(name, flags);
        param.nargs = Nargs::Fixed(0);
        param.ty = ParamType::Bool;
        param.is_flag = true;
        param
    }

    /// 반복 횟수를 세는 플래그(`-vvv`).
    pub fn counter<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut param = Self::option(name, flags);
        param.nargs = Nargs::Fixed(0);
        param.ty = ParamType::IntRange {
            min: Some(0),
            max: None,
        };
        param.count = true;
        param
    }

    pub fn argument(name: impl Into<String>) -> Self {
        let mut param = Self::option(name, Vec::<String>::new());
        param.kind = ParamKind::Argument;
        param.required = true;
        param
    }

    pub fn ty(mut self, ty: ParamType) -> Self {
        if let Some(arity) = ty.arity() {
            self.nargs = Nargs::Fixed(arity);
        }
        self.ty = ty;
        self
    }

    pub fn nargs(mut self, nargs: Nargs) -> Self {
        self.nargs = nargs;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    pub fn secondary_flags<I, S>(mut self, secondary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ParamKind::Option {
            secondary_flags, ..
        } = &mut self.kind
        {
            *secondary_flags = secondary.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn completer(mut self, hook: CompletionHook) -> Self {
        self.completer = Some(hook);
        self
    }

    pub fn value_check(mut self, check: ValueCheck) -> Self {
        self.value_check = Some(check);
        self
    }

    pub fn is_option(&self) -> bool {
        matches!(self.kind, ParamKind::Option { .. })
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, ParamKind::Argument)
    }

    /// 화면 표기용 이름(`_` → `-`).
    pub fn display_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn flags(&self) -> &[String] {
        match &self.kind {
            ParamKind::Option { flags, .. } => flags,
            ParamKind::Argument => &[],
        }
    }

    pub fn secondary(&self) -> &[String] {
        match &self.kind {
            ParamKind::Option {
                secondary_flags, ..
            } => secondary_flags,
            ParamKind::Argument => &[],
        }
    }

    /// on/off 플래그를 모두 포함한 전체 플래그 목록.
    pub fn all_flags(&self) -> impl Iterator<Item = &String> {
        self.flags().iter().chain(self.secondary().iter())
    }

    pub fn takes_value(&self) -> bool {
        self.nargs != Nargs::Fixed(0)
    }

    /// 고정 개수 파라미터의 필요 값 개수. 무제한이면 None.
    pub fn required_values(&self) -> Option<usize> {
        match self.nargs {
            Nargs::Fixed(n) => Some(n),
            Nargs::Unbounded => None,
        }
    }

    /// 반복 사용이 허용되어 "사용됨" 상태로 고정되지 않는 파라미터인지 여부.
    pub fn repeatable(&self) -> bool {
        self.multiple || self.count
    }

    /// 완성된 값 하나를 타입 규칙과 사용자 검사 훅으로 확인한다.
    pub fn check_value(&self, index: usize, value: &str) -> Result<Result<(), String>, CheckPanic> {
        if let Err(message) = self.ty.check_at(index, value) {
            return Ok(Err(message));
        }
        match &self.value_check {
            Some(check) => check.run(value),
            None => Ok(Ok(())),
        }
    }
}

/// 실행 진입점을 가진 말단 노드.
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub help: Option<String>,
    pub hidden: bool,
    pub params: Vec<Parameter>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn arguments(&self) -> impl Iterator<Item = (usize, &Parameter)> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_argument())
    }

    /// 플래그가 정확히 일치하는 옵션을 찾는다.
    pub fn option_by_flag(&self, flag: &str) -> Option<(usize, &Parameter)> {
        self.params
            .iter()
            .enumerate()
            .find(|(_, p)| p.is_option() && p.all_flags().any(|f| f == flag))
    }

    fn validate(&self) -> Result<(), TreeError> {
        if self.name.trim().is_empty() {
            return Err(TreeError::EmptyName);
        }

        let mut seen_names: Vec<String> = Vec::new();
        let mut seen_flags: Vec<&str> = Vec::new();
        let mut unbounded_seen: Option<&str> = None;

        for param in &self.params {
            let normalized = normalize_name(&param.name);
            if param.name.is_empty() {
                return Err(TreeError::EmptyName);
            }
            if seen_names.contains(&normalized) {
                return Err(TreeError::DuplicateParam {
                    command: self.name.clone(),
                    name: param.name.clone(),
                });
            }
            seen_names.push(normalized);

            match &param.kind {
                ParamKind::Option { flags, .. } => {
                    if flags.is_empty() {
                        return Err(TreeError::MissingFlags {
                            command: self.name.clone(),
                            name: param.name.clone(),
                        });
                    }
                    for flag in param.all_flags() {
                        if seen_flags.contains(&flag.as_str()) {
                            return Err(TreeError::DuplicateParam {
                                command: self.name.clone(),
                                name: flag.clone(),
                            });
                        }
                        seen_flags.push(flag);
                    }
                }
                ParamKind::Argument => {
                    if let Some(name) = unbounded_seen {
                        return Err(TreeError::ArgumentPosition {
                            command: self.name.clone(),
                            name: name.to_string(),
                        });
                    }
                    if param.nargs == Nargs::Unbounded {
                        unbounded_seen = Some(&param.name);
                    }
                }
            }
        }
        Ok(())
    }
}

/// 이름 있는 자식 노드를 가진 그룹.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub aliases: Vec<String>,
    pub help: Option<String>,
    pub hidden: bool,
    pub children: Vec<Node>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.children.push(Node::Command(command));
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.children.push(Node::Group(group));
        self
    }

    /// 이름 또는 별칭으로 직계 자식을 찾는다.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.matches(name))
    }

    pub fn visible_children(&self, show_hidden: bool) -> impl Iterator<Item = &Node> {
        self.children
            .iter()
            .filter(move |child| show_hidden || !child.hidden())
    }

    fn validate(&self) -> Result<(), TreeError> {
        if self.name.trim().is_empty() {
            return Err(TreeError::EmptyName);
        }

        let mut seen: Vec<String> = Vec::new();
        for child in &self.children {
            for name in std::iter::once(child.name()).chain(child.aliases().iter().map(String::as_str)) {
                let normalized = normalize_name(name);
                if seen.contains(&normalized) {
                    return Err(TreeError::DuplicateName {
                        group: self.name.clone(),
                        name: name.to_string(),
                    });
                }
                seen.push(normalized);
            }
            match child {
                Node::Group(group) => group.validate()?,
                Node::Command(command) => command.validate()?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Group(Group),
    Command(Command),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Group(g) => &g.name,
            Node::Command(c) => &c.name,
        }
    }

    pub fn aliases(&self) -> &[String] {
        match self {
            Node::Group(g) => &g.aliases,
            Node::Command(c) => &c.aliases,
        }
    }

    pub fn help(&self) -> Option<&str> {
        match self {
            Node::Group(g) => g.help.as_deref(),
            Node::Command(c) => c.help.as_deref(),
        }
    }

    pub fn hidden(&self) -> bool {
        match self {
            Node::Group(g) => g.hidden,
            Node::Command(c) => c.hidden,
        }
    }

    pub fn matches(&self, typed: &str) -> bool {
        names_match(self.name(), typed) || self.aliases().iter().any(|a| names_match(a, typed))
    }
}

/// 검증을 통과한 명령 트리. 생성 이후에는 읽기 전용이다.
#[derive(Debug, Clone)]
pub struct CommandTree {
    root: Group,
}

impl CommandTree {
    pub fn new(root: Group) -> Result<Self, TreeError> {
        root.validate()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    /// 이름 경로를 따라 하위 그룹을 찾는다. 빈 경로는 루트다.
    pub fn group_at(&self, path: &[String]) -> Option<&Group> {
        let mut current = &self.root;
        for name in path {
            match current.child(name)? {
                Node::Group(group) => current = group,
                Node::Command(_) => return None,
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marks() -> Command {
        Command::new("get_marks")
            .param(Parameter::option("student_name", ["--student-name", "-s"]))
            .param(Parameter::argument("subject"))
    }

    #[test]
    fn underscore_and_hyphen_names_match() {
        let root = Group::new("cli").command(marks());
        let tree = CommandTree::new(root).unwrap();
        assert!(tree.root().child("get-marks").is_some());
        assert!(tree.root().child("get_marks").is_some());
        assert!(tree.root().child("get").is_none());
    }

    #[test]
    fn duplicate_child_names_are_rejected() {
        let root = Group::new("cli")
            .command(Command::new("run"))
            .command(Command::new("build").alias("run"));
        assert_eq!(
            CommandTree::new(root).unwrap_err(),
            TreeError::DuplicateName {
                group: "cli".to_string(),
                name: "run".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_flags_are_rejected() {
        let command = Command::new("run")
            .param(Parameter::option("a", ["--name"]))
            .param(Parameter::option("b", ["--name"]));
        let err = CommandTree::new(Group::new("cli").command(command)).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateParam { .. }));
    }

    #[test]
    fn unbounded_argument_must_be_last() {
        let command = Command::new("copy")
            .param(Parameter::argument("src").nargs(Nargs::Unbounded))
            .param(Parameter::argument("dst"));
        let err = CommandTree::new(Group::new("cli").command(command)).unwrap_err();
        assert_eq!(
            err,
            TreeError::ArgumentPosition {
                command: "copy".to_string(),
                name: "src".to_string(),
            }
        );
    }

    #[test]
    fn tuple_type_fixes_nargs() {
        let param = Parameter::option("point", ["--point"])
            .ty(ParamType::Tuple(vec![ParamType::Integer, ParamType::Integer]));
        assert_eq!(param.nargs, Nargs::Fixed(2));
    }

    #[test]
    fn value_check_panics_are_captured() {
        let param = Parameter::argument("x")
            .value_check(ValueCheck::new(|_| panic!("boom")));
        let err = param.check_value(0, "1").unwrap_err();
        assert_eq!(err.0, "boom");
    }

    #[test]
    fn group_path_lookup() {
        let root = Group::new("cli").group(Group::new("class").command(Command::new("list")));
        let tree = CommandTree::new(root).unwrap();
        assert_eq!(
            tree.group_at(&["class".to_string()]).map(|g| g.name.as_str()),
            Some("class")
        );
        assert!(tree.group_at(&["nope".to_string()]).is_none());
    }
}
