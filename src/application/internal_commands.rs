//! REPL 전용 내부 명령(`:help`, `:exit` 등)과 쉘 이스케이프(`!cmd`).
//!
//! 별칭 여러 개가 하나의 레코드를 공유한다. 레코드 식별은 `Arc` 포인터로 한다.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use crossterm::Command as _;
use crossterm::{cursor, terminal};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::ports::SystemShell;

pub const DEFAULT_INTERNAL_PREFIX: &str = ":";
pub const DEFAULT_SYSTEM_PREFIX: &str = "!";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalCommandError {
    #[error("internal and system command prefixes must differ (both are '{0}')")]
    SamePrefix(String),
    #[error("command prefix must be a non-empty string without whitespace")]
    InvalidPrefix,
    #[error("invalid internal command name '{0}'")]
    InvalidName(String),
    #[error("internal command '{0}' is already registered")]
    NameCollision(String),
    #[error("no internal command named '{0}'")]
    NotFound(String),
    #[error("Enter a proper {0} command.")]
    Empty(PrefixKind),
    #[error("internal command '{name}' failed: {message}")]
    Failed { name: String, message: String },
    #[error("failed to run system command: {0}")]
    Spawn(String),
    #[error("system command exited with {0}")]
    NonZeroExit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    Internal,
    System,
}

impl std::fmt::Display for PrefixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::System => f.write_str("system"),
        }
    }
}

/// 내부 명령/쉘 이스케이프 접두어. `None`이면 해당 기능이 꺼진다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTable {
    internal: Option<String>,
    system: Option<String>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self {
            internal: Some(DEFAULT_INTERNAL_PREFIX.to_string()),
            system: Some(DEFAULT_SYSTEM_PREFIX.to_string()),
        }
    }
}

impl PrefixTable {
    pub fn new(
        internal: Option<String>,
        system: Option<String>,
    ) -> Result<Self, InternalCommandError> {
        check_prefix(internal.as_deref())?;
        check_prefix(system.as_deref())?;
        if let (Some(a), Some(b)) = (&internal, &system)
            && a == b
        {
            return Err(InternalCommandError::SamePrefix(a.clone()));
        }
        Ok(Self { internal, system })
    }

    pub fn internal(&self) -> Option<&str> {
        self.internal.as_deref()
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn set_internal(&mut self, prefix: Option<String>) -> Result<(), InternalCommandError> {
        *self = Self::new(prefix, self.system.clone())?;
        Ok(())
    }

    pub fn set_system(&mut self, prefix: Option<String>) -> Result<(), InternalCommandError> {
        *self = Self::new(self.internal.clone(), prefix)?;
        Ok(())
    }

    /// 줄이 어떤 접두어로 시작하는지 판정한다. 긴 접두어를 먼저 본다.
    pub fn classify(&self, line: &str) -> Option<(PrefixKind, &str)> {
        let line = line.trim_start();
        let mut candidates: Vec<(PrefixKind, &str)> = Vec::with_capacity(2);
        if let Some(p) = self.internal() {
            candidates.push((PrefixKind::Internal, p));
        }
        if let Some(p) = self.system() {
            candidates.push((PrefixKind::System, p));
        }
        candidates.sort_by_key(|(_, p)| std::cmp::Reverse(p.len()));
        candidates
            .into_iter()
            .find(|(_, prefix)| line.starts_with(prefix))
    }
}

fn check_prefix(prefix: Option<&str>) -> Result<(), InternalCommandError> {
    match prefix {
        Some(p) if p.is_empty() || p.chars().any(char::is_whitespace) => {
            Err(InternalCommandError::InvalidPrefix)
        }
        _ => Ok(()),
    }
}

/// 새 별칭이 기존 별칭과 겹칠 때의 처리 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// 해당 별칭의 바인딩만 교체한다.
    #[default]
    Replace,
    Reject,
}

type InternalCallback = dyn Fn(&mut InternalInvocation<'_>) -> Result<()> + Send + Sync;

/// 별칭들이 공유하는 내부 명령 레코드.
pub struct InternalCommand {
    pub name: String,
    pub description: String,
    callback: Box<InternalCallback>,
}

impl std::fmt::Debug for InternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalCommand")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// 내부 명령 콜백에 넘기는 실행 문맥.
pub struct InternalInvocation<'a> {
    pub out: &'a mut dyn Write,
    commands: &'a InternalCommandSystem,
    exit_requested: bool,
}

impl InternalInvocation<'_> {
    pub fn commands(&self) -> &InternalCommandSystem {
        self.commands
    }

    pub fn prefixes(&self) -> &PrefixTable {
        &self.commands.prefixes
    }

    /// 현재 REPL 레벨을 종료하도록 요청한다.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }
}

/// 접두어가 붙은 줄을 처리한 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalOutcome {
    Continue,
    Exit,
}

/// 같은 레코드를 가리키는 별칭 묶음.
#[derive(Debug, Clone)]
pub struct CommandListing {
    pub aliases: Vec<String>,
    pub command: Arc<InternalCommand>,
}

/// 완성 엔진이 다른 스레드에서 쓰는 내부 명령 목록 스냅샷.
#[derive(Debug, Clone, Default)]
pub struct InternalCatalog {
    pub prefixes: PrefixTable,
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub aliases: Vec<String>,
    pub description: String,
}

/// 내부 명령 레지스트리.
#[derive(Debug, Clone)]
pub struct InternalCommandSystem {
    prefixes: PrefixTable,
    aliases: Vec<(String, Arc<InternalCommand>)>,
    policy: CollisionPolicy,
}

impl InternalCommandSystem {
    /// 기본 명령(cls/clear, ?/h/help, q/quit/exit)을 등록한 상태로 만든다.
    pub fn new(prefixes: PrefixTable) -> Self {
        let mut system = Self::empty(prefixes);
        system.register_defaults();
        system
    }

    pub fn empty(prefixes: PrefixTable) -> Self {
        Self {
            prefixes,
            aliases: Vec::new(),
            policy: CollisionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn prefixes(&self) -> &PrefixTable {
        &self.prefixes
    }

    pub fn set_internal_prefix(&mut self, prefix: Option<String>) -> Result<(), InternalCommandError> {
        self.prefixes.set_internal(prefix)
    }

    pub fn set_system_prefix(&mut self, prefix: Option<String>) -> Result<(), InternalCommandError> {
        self.prefixes.set_system(prefix)
    }

    pub fn get_prefix(&self, line: &str) -> Option<(PrefixKind, &str)> {
        self.prefixes.classify(line)
    }

    /// 하나의 레코드를 여러 별칭으로 등록한다. 별칭은 소문자로 저장된다.
    pub fn register<F>(
        &mut self,
        names: &[&str],
        description: impl Into<String>,
        callback: F,
    ) -> Result<(), InternalCommandError>
    where
        F: Fn(&mut InternalInvocation<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let aliases = names
            .iter()
            .map(|name| normalize_alias(name))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(primary) = aliases.first().cloned() else {
            return Err(InternalCommandError::InvalidName(String::new()));
        };

        if self.policy == CollisionPolicy::Reject
            && let Some(taken) = aliases.iter().find(|a| self.get_command(a).is_some())
        {
            return Err(InternalCommandError::NameCollision(taken.clone()));
        }

        let record = Arc::new(InternalCommand {
            name: primary,
            description: description.into(),
            callback: Box::new(callback),
        });
        for alias in aliases {
            match self.aliases.iter_mut().find(|(name, _)| *name == alias) {
                Some(slot) => {
                    debug!(alias = %alias, "internal command alias replaced");
                    slot.1 = Arc::clone(&record);
                }
                None => self.aliases.push((alias, Arc::clone(&record))),
            }
        }
        Ok(())
    }

    /// 인자 없는 클로저를 등록한다.
    pub fn register_fn<F>(
        &mut self,
        names: &[&str],
        description: impl Into<String>,
        callback: F,
    ) -> Result<(), InternalCommandError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(names, description, move |_| {
            callback();
            Ok(())
        })
    }

    /// 별칭을 제거한다. `remove_all_aliases`면 같은 레코드의 별칭을 모두 지운다.
    pub fn remove(&mut self, name: &str, remove_all_aliases: bool) -> Result<(), InternalCommandError> {
        let alias = name.trim().to_lowercase();
        let Some(record) = self.get_command(&alias) else {
            return Err(InternalCommandError::NotFound(alias));
        };

        if remove_all_aliases {
            self.aliases.retain(|(_, cmd)| !Arc::ptr_eq(cmd, &record));
        } else {
            self.aliases.retain(|(a, _)| *a != alias);
        }
        Ok(())
    }

    pub fn get_command(&self, name: &str) -> Option<Arc<InternalCommand>> {
        let alias = name.trim().to_lowercase();
        self.aliases
            .iter()
            .find(|(a, _)| *a == alias)
            .map(|(_, cmd)| Arc::clone(cmd))
    }

    /// 레코드별로 별칭을 묶은 목록(등록 순서).
    pub fn list_commands(&self) -> Vec<CommandListing> {
        let mut listings: Vec<CommandListing> = Vec::new();
        for (alias, cmd) in &self.aliases {
            match listings
                .iter_mut()
                .find(|l| Arc::ptr_eq(&l.command, cmd))
            {
                Some(listing) => listing.aliases.push(alias.clone()),
                None => listings.push(CommandListing {
                    aliases: vec![alias.clone()],
                    command: Arc::clone(cmd),
                }),
            }
        }
        listings
    }

    pub fn catalog(&self) -> InternalCatalog {
        InternalCatalog {
            prefixes: self.prefixes.clone(),
            entries: self
                .list_commands()
                .into_iter()
                .map(|l| CatalogEntry {
                    aliases: l.aliases,
                    description: l.command.description.clone(),
                })
                .collect(),
        }
    }

    /// 접두어가 붙은 줄을 실행한다. 접두어가 없으면 None.
    pub fn handle_line(
        &self,
        line: &str,
        out: &mut dyn Write,
        shell: &dyn SystemShell,
    ) -> Option<Result<InternalOutcome, InternalCommandError>> {
        let (kind, prefix) = self.get_prefix(line)?;
        let rest = line.trim_start()[prefix.len()..].trim();
        debug!(kind = %kind, rest, "prefixed line");

        if rest.is_empty() {
            return Some(Err(InternalCommandError::Empty(kind)));
        }

        Some(match kind {
            PrefixKind::Internal => self.execute(rest, out),
            PrefixKind::System => run_system(shell, rest, out),
        })
    }

    /// 첫 단어를 별칭으로 찾아 콜백을 실행한다.
    pub fn execute(&self, rest: &str, out: &mut dyn Write) -> Result<InternalOutcome, InternalCommandError> {
        let name = rest.split_whitespace().next().unwrap_or_default();
        let Some(command) = self.get_command(name) else {
            return Err(InternalCommandError::NotFound(name.to_lowercase()));
        };

        let mut invocation = InternalInvocation {
            out,
            commands: self,
            exit_requested: false,
        };
        (command.callback)(&mut invocation).map_err(|err| InternalCommandError::Failed {
            name: command.name.clone(),
            message: format!("{err:#}"),
        })?;

        Ok(if invocation.exit_requested {
            InternalOutcome::Exit
        } else {
            InternalOutcome::Continue
        })
    }

    fn register_defaults(&mut self) {
        let defaults: [(&[&str], &str, fn(&mut InternalInvocation<'_>) -> Result<()>); 3] = [
            (&["cls", "clear"], "Clears screen", clear_screen),
            (&["?", "h", "help"], "Displays general help information", repl_help),
            (&["q", "quit", "exit"], "Exits the REPL", exit_repl),
        ];
        for (names, description, callback) in defaults {
            if let Err(err) = self.register(names, description, callback) {
                warn!(%err, "failed to register default internal command");
            }
        }
    }
}

fn normalize_alias(name: &str) -> Result<String, InternalCommandError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(InternalCommandError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

fn run_system(
    shell: &dyn SystemShell,
    command: &str,
    out: &mut dyn Write,
) -> Result<InternalOutcome, InternalCommandError> {
    let status = shell
        .run(command, out)
        .map_err(|err| InternalCommandError::Spawn(format!("{err:#}")))?;
    if status.success {
        return Ok(InternalOutcome::Continue);
    }
    let code = status
        .code
        .map(|c| format!("status {c}"))
        .unwrap_or_else(|| "a signal".to_string());
    Err(InternalCommandError::NonZeroExit(code))
}

fn clear_screen(inv: &mut InternalInvocation<'_>) -> Result<()> {
    let mut ansi = String::new();
    terminal::Clear(terminal::ClearType::All).write_ansi(&mut ansi)?;
    cursor::MoveTo(0, 0).write_ansi(&mut ansi)?;
    inv.out.write_all(ansi.as_bytes())?;
    inv.out.flush()?;
    Ok(())
}

fn exit_repl(inv: &mut InternalInvocation<'_>) -> Result<()> {
    inv.request_exit();
    Ok(())
}

fn repl_help(inv: &mut InternalInvocation<'_>) -> Result<()> {
    let prefixes = inv.prefixes().clone();
    let listings = inv.commands().list_commands();
    let out = &mut *inv.out;

    writeln!(out, "REPL help:")?;
    writeln!(out)?;

    match prefixes.internal() {
        Some(prefix) => {
            writeln!(out, "  Internal commands (prefix '{prefix}'):")?;
            let rows = listings
                .iter()
                .map(|l| {
                    let names = l
                        .aliases
                        .iter()
                        .map(|a| format!("{prefix}{a}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    (names, l.command.description.clone())
                })
                .collect::<Vec<_>>();
            let width = rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
            for (names, description) in rows {
                writeln!(out, "    {names:<width$}  {description}")?;
            }
        }
        None => writeln!(out, "  Internal commands are disabled.")?,
    }
    writeln!(out)?;

    match prefixes.system() {
        Some(prefix) => writeln!(
            out,
            "  System commands: prefix a shell command with '{prefix}' (e.g. {prefix}ls)"
        )?,
        None => writeln!(out, "  System commands are disabled.")?,
    }
    writeln!(out)?;
    writeln!(out, "  Use '--help' after any application command for its usage.")?;
    Ok(())
}
