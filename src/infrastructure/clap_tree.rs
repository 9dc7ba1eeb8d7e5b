//! clap 명령 정의를 명령 트리로 옮기고, 완성된 줄을 clap으로 실행하는 어댑터.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, ValueHint};
use tracing::debug;

use crate::application::ports::Dispatcher;
use crate::application::session::{DispatchError, Invocation};
use crate::domain::param_type::{ParamType, PathKind};
use crate::domain::tree::{Command, CommandTree, Group, Nargs, Node, Parameter, TreeError, normalize_name};

/// 서브커맨드 경로(공백 구분)별 실행 핸들러.
pub type Handler = Arc<dyn Fn(&ArgMatches, &mut Invocation<'_>) -> Result<()> + Send + Sync>;

/// clap 정의를 그대로 옮긴다.
pub fn from_clap(command: &clap::Command) -> Result<CommandTree, TreeError> {
    from_clap_with(command, |_, _| {})
}

/// clap이 표현하지 못하는 타입/훅을 `refine`으로 덧붙인다.
/// `refine`은 (명령 경로, 파라미터)마다 한 번 호출된다.
pub fn from_clap_with<F>(command: &clap::Command, mut refine: F) -> Result<CommandTree, TreeError>
where
    F: FnMut(&[&str], &mut Parameter),
{
    let mut path = Vec::new();
    let root = group_from(command, &mut path, &mut refine);
    CommandTree::new(root)
}

fn group_from<'c, F>(command: &'c clap::Command, path: &mut Vec<&'c str>, refine: &mut F) -> Group
where
    F: FnMut(&[&str], &mut Parameter),
{
    let mut group = Group::new(command.get_name());
    group.aliases = command.get_all_aliases().map(str::to_string).collect();
    group.help = command.get_about().map(|about| about.to_string());
    group.hidden = command.is_hide_set();

    for sub in command.get_subcommands() {
        path.push(sub.get_name());
        let node = if sub.has_subcommands() {
            Node::Group(group_from(sub, path, refine))
        } else {
            Node::Command(command_from(sub, path, refine))
        };
        path.pop();
        group.children.push(node);
    }
    group
}

fn command_from<F>(command: &clap::Command, path: &[&str], refine: &mut F) -> Command
where
    F: FnMut(&[&str], &mut Parameter),
{
    let mut out = Command::new(command.get_name());
    out.aliases = command.get_all_aliases().map(str::to_string).collect();
    out.help = command.get_about().map(|about| about.to_string());
    out.hidden = command.is_hide_set();

    for arg in command.get_arguments() {
        let Some(mut param) = param_from(arg) else {
            continue;
        };
        refine(path, &mut param);
        out.params.push(param);
    }
    out
}

fn param_from(arg: &Arg) -> Option<Parameter> {
    let action = arg.get_action();
    if matches!(
        action,
        ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong | ArgAction::Version
    ) {
        return None;
    }

    let name = arg.get_id().as_str().to_string();
    let appends = matches!(action, ArgAction::Append);
    let mut param = if arg.is_positional() {
        Parameter::argument(name).required(arg.is_required_set())
    } else {
        let flags = flags_of(arg);
        match action {
            ArgAction::SetTrue | ArgAction::SetFalse => Parameter::flag(name, flags),
            ArgAction::Count => Parameter::counter(name, flags),
            _ => Parameter::option(name, flags).required(arg.is_required_set()),
        }
    };

    if param.takes_value() {
        param = param.nargs(nargs_of(arg, appends && arg.is_positional()));
        if let Some(ty) = type_of(arg) {
            param = param.ty(ty);
        }
    }
    if appends && !arg.is_positional() {
        param = param.multiple();
    }
    if arg.is_hide_set() {
        param = param.hidden();
    }
    if let Some(help) = arg.get_help() {
        param = param.help(help.to_string());
    }
    if let Some(metavar) = arg.get_value_names().and_then(|names| names.first()) {
        param = param.metavar(metavar.to_string());
    }
    Some(param)
}

fn flags_of(arg: &Arg) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(long) = arg.get_long() {
        flags.push(format!("--{long}"));
    }
    for alias in arg.get_all_aliases().unwrap_or_default() {
        flags.push(format!("--{alias}"));
    }
    if let Some(short) = arg.get_short() {
        flags.push(format!("-{short}"));
    }
    for alias in arg.get_all_short_aliases().unwrap_or_default() {
        flags.push(format!("-{alias}"));
    }
    flags
}

fn nargs_of(arg: &Arg, appends: bool) -> Nargs {
    match arg.get_num_args() {
        Some(range) if range.max_values() == usize::MAX => Nargs::Unbounded,
        Some(range) => Nargs::Fixed(range.max_values()),
        None if appends => Nargs::Unbounded,
        None => Nargs::Fixed(1),
    }
}

fn type_of(arg: &Arg) -> Option<ParamType> {
    // 빌드 전 Arg는 takes_value가 확정되지 않으므로 파서에서 직접 읽는다.
    let choices: Vec<String> = arg
        .get_value_parser()
        .possible_values()
        .map(|values| {
            values
                .filter(|value| !value.is_hide_set())
                .map(|value| value.get_name().to_string())
                .collect()
        })
        .unwrap_or_default();
    if choices == ["true", "false"] {
        return Some(ParamType::Bool);
    }
    if !choices.is_empty() {
        return Some(ParamType::Choice {
            choices,
            case_sensitive: !arg.is_ignore_case_set(),
        });
    }

    match arg.get_value_hint() {
        ValueHint::FilePath => Some(ParamType::Path {
            kind: PathKind::File,
            must_exist: false,
        }),
        ValueHint::DirPath => Some(ParamType::directory()),
        ValueHint::AnyPath => Some(ParamType::path()),
        _ => None,
    }
}

/// clap으로 명령 줄을 해석하고 등록된 핸들러를 실행한다.
pub struct ClapDispatcher {
    command: clap::Command,
    tree: Arc<CommandTree>,
    handlers: HashMap<String, Handler>,
}

impl ClapDispatcher {
    pub fn new(command: clap::Command) -> Result<Self> {
        let tree = from_clap(&command).context("failed to build command tree from clap definition")?;
        Ok(Self::with_tree(command, tree))
    }

    /// `from_clap_with`로 보강한 트리를 함께 쓴다.
    pub fn with_tree(command: clap::Command, tree: CommandTree) -> Self {
        Self {
            command,
            tree: Arc::new(tree),
            handlers: HashMap::new(),
        }
    }

    /// `path`는 서브커맨드 이름을 공백으로 이은 것이다(`"class students"`). 루트는 빈 문자열.
    pub fn handler<F>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(&ArgMatches, &mut Invocation<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let key = path.split_whitespace().collect::<Vec<_>>().join(" ");
        self.handlers.insert(key, Arc::new(handler));
        self
    }

    pub fn command(&self) -> &clap::Command {
        &self.command
    }

    /// 서브커맨드 위치의 `get_marks` 같은 표기를 clap이 아는 이름으로 바꾼다.
    fn resolve_args(&self, args: &[String]) -> Vec<String> {
        let mut resolved = Vec::with_capacity(args.len());
        let mut current = Some(&self.command);
        for arg in args {
            let sub = current.and_then(|cmd| find_subcommand(cmd, arg));
            match sub {
                Some(sub) => resolved.push(sub.get_name().to_string()),
                None => resolved.push(arg.clone()),
            }
            current = sub;
        }
        resolved
    }

    fn command_path(&self, args: &[String]) -> String {
        let mut names = vec![self.command.get_name().to_string()];
        let mut current = &self.command;
        for arg in args {
            let Some(sub) = find_subcommand(current, arg) else {
                break;
            };
            names.push(sub.get_name().to_string());
            current = sub;
        }
        names.join(" ")
    }

    fn clap_error(&self, args: &[String], err: clap::Error, inv: &mut Invocation<'_>) -> DispatchError {
        match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                if let Err(write_err) = write!(inv.out, "{}", err.render()) {
                    return DispatchError::Failed(
                        anyhow::Error::new(write_err).context("failed to write help output"),
                    );
                }
                DispatchError::Exit
            }
            _ => DispatchError::Usage {
                command: self.command_path(args),
                message: usage_message(&err),
            },
        }
    }
}

fn find_subcommand<'c>(command: &'c clap::Command, name: &str) -> Option<&'c clap::Command> {
    command.find_subcommand(name).or_else(|| {
        let wanted = normalize_name(name);
        command.get_subcommands().find(|sub| {
            normalize_name(sub.get_name()) == wanted
                || sub.get_all_aliases().any(|alias| normalize_name(alias) == wanted)
        })
    })
}

/// clap 오류 본문의 첫 줄에서 `error: ` 접두어를 뗀다.
fn usage_message(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).trim().to_string()
}

impl Dispatcher for ClapDispatcher {
    fn tree(&self) -> Arc<CommandTree> {
        Arc::clone(&self.tree)
    }

    fn dispatch(&self, args: &[String], invocation: &mut Invocation<'_>) -> Result<(), DispatchError> {
        let args = self.resolve_args(args);
        let argv = std::iter::once(self.command.get_name().to_string()).chain(args.iter().cloned());
        let matches = self
            .command
            .clone()
            .try_get_matches_from(argv)
            .map_err(|err| self.clap_error(&args, err, invocation))?;

        let mut path = Vec::new();
        let mut current = &matches;
        while let Some((name, sub)) = current.subcommand() {
            path.push(name);
            current = sub;
        }
        let key = path.join(" ");

        let Some(handler) = self.handlers.get(&key) else {
            return Err(DispatchError::Failed(anyhow!("no handler registered for '{key}'")));
        };
        debug!(command = %key, "running handler");
        handler(current, invocation).map_err(DispatchError::Failed)
    }
}
