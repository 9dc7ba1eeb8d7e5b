//! REPL 세션 상태 기계.
//!
//! 중첩 REPL은 `SessionState` 스택으로 표현한다. 진입은 push, 종료는 pop이다.
//! 모든 레벨은 하나의 `DispatchContext`를 공유한다.

use std::any::Any;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::assist::{LineAssist, PromptFrame};
use crate::application::completion::Completer;
use crate::application::config::ReplConfig;
use crate::application::internal_commands::{InternalCommandSystem, InternalOutcome};
use crate::application::ports::{Dispatcher, ErrorSink, History, LineReader, ReadOutcome, SystemShell};
use crate::application::status_bar::StatusBar;
use crate::application::validation::Validator;
use crate::domain::tokenizer::{split_args, strip_comment};
use crate::domain::tree::CommandTree;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 명령 실행 사이에 유지되는 공유 컨텍스트.
/// REPL 안에서는 모든 줄이 같은 인스턴스를 재사용한다.
pub struct DispatchContext {
    id: u64,
    obj: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("id", &self.id)
            .field("has_obj", &self.obj.is_some())
            .finish()
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            obj: None,
        }
    }

    /// 인스턴스 식별자. 새 컨텍스트마다 다르다.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn obj<T: Any>(&self) -> Option<&T> {
        self.obj.as_ref().and_then(|o| o.downcast_ref::<T>())
    }

    pub fn obj_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.obj.as_mut().and_then(|o| o.downcast_mut::<T>())
    }

    pub fn set_obj<T: Any + Send>(&mut self, value: T) {
        self.obj = Some(Box::new(value));
    }

    pub fn take_obj<T: Any + Send>(&mut self) -> Option<T> {
        let boxed = self.obj.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.obj = Some(other);
                None
            }
        }
    }
}

/// 명령 실행 실패. REPL에서는 출력 후 다음 줄로 넘어간다.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{command}: {message}")]
    Usage { command: String, message: String },
    /// 도움말/버전 출력처럼 정상 종료에 해당하는 중단.
    #[error("exit requested")]
    Exit,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingLine,
    Classifying,
    Dispatching,
    Exiting,
}

type Callback = Box<dyn FnMut() + Send>;

/// 오래된 것부터 보관하는 메모리 이력.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    entries: Vec<String>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(entries: &[String]) -> Self {
        Self {
            entries: entries.to_vec(),
        }
    }
}

impl History for InMemoryHistory {
    fn entries(&self) -> &[String] {
        &self.entries
    }

    fn append(&mut self, line: &str) -> Result<()> {
        self.entries.push(line.to_string());
        Ok(())
    }
}

/// REPL 한 레벨의 상태.
pub struct SessionState {
    prompt: String,
    commands: InternalCommandSystem,
    history: Box<dyn History>,
    phase: Phase,
    group_path: Vec<String>,
    on_startup: Option<Callback>,
    on_cleanup: Option<Callback>,
    started: bool,
}

impl SessionState {
    pub fn new(prompt: impl Into<String>, commands: InternalCommandSystem, history: Box<dyn History>) -> Self {
        Self {
            prompt: prompt.into(),
            commands,
            history,
            phase: Phase::AwaitingLine,
            group_path: Vec::new(),
            on_startup: None,
            on_cleanup: None,
            started: false,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn group_path(&self) -> &[String] {
        &self.group_path
    }

    pub fn history(&self) -> &[String] {
        self.history.entries()
    }

    pub fn commands(&self) -> &InternalCommandSystem {
        &self.commands
    }

    /// 처음 입력 대기에 들어갈 때 한 번만 시작 콜백을 실행한다.
    fn begin(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if let Some(startup) = self.on_startup.as_mut() {
            startup();
        }
    }

    /// 종료 전이. 시작된 레벨의 정리 콜백은 정확히 한 번 실행된다.
    fn exit(&mut self) {
        if self.phase == Phase::Exiting {
            return;
        }
        self.phase = Phase::Exiting;
        if self.started
            && let Some(mut cleanup) = self.on_cleanup.take()
        {
            cleanup();
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.exit();
    }
}

/// 명령 핸들러가 요청하는 중첩 REPL 설정.
#[derive(Default)]
pub struct NestedRepl {
    prompt: Option<String>,
    group_path: Vec<String>,
    history: Option<Box<dyn History>>,
    on_startup: Option<Callback>,
    on_cleanup: Option<Callback>,
}

impl NestedRepl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// 중첩 레벨에서 입력이 해석될 하위 그룹 경로.
    pub fn group_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_path = path.into_iter().map(Into::into).collect();
        self
    }

    pub fn history(mut self, history: Box<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn on_startup(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_startup = Some(Box::new(callback));
        self
    }

    pub fn on_cleanup(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_cleanup = Some(Box::new(callback));
        self
    }
}

/// 명령 핸들러에 넘기는 실행 문맥. 전역 조회 대신 세션을 명시적으로 전달한다.
pub struct Invocation<'a> {
    ctx: &'a mut DispatchContext,
    session: Option<&'a mut SessionState>,
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
    nested: Option<NestedRepl>,
}

impl<'a> Invocation<'a> {
    /// REPL 밖의 단발 실행 문맥.
    pub fn one_shot(ctx: &'a mut DispatchContext, out: &'a mut dyn Write, err: &'a mut dyn Write) -> Self {
        Self {
            ctx,
            session: None,
            out,
            err,
            nested: None,
        }
    }

    pub fn ctx(&self) -> &DispatchContext {
        self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut DispatchContext {
        self.ctx
    }

    pub fn in_repl(&self) -> bool {
        self.session.is_some()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.session.as_deref().map(SessionState::prompt)
    }

    /// 현재 레벨의 프롬프트를 바꾼다. REPL 밖이면 false.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> bool {
        match self.session.as_deref_mut() {
            Some(session) => {
                session.prompt = prompt.into();
                true
            }
            None => false,
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.session
            .as_deref()
            .map(|s| s.history().to_vec())
            .unwrap_or_default()
    }

    pub fn commands_mut(&mut self) -> Option<&mut InternalCommandSystem> {
        self.session.as_deref_mut().map(|s| &mut s.commands)
    }

    /// 현재 실행이 끝난 뒤 중첩 REPL로 들어가도록 요청한다. REPL 밖이면 false.
    pub fn enter_repl(&mut self, nested: NestedRepl) -> bool {
        if self.session.is_none() {
            return false;
        }
        self.nested = Some(nested);
        true
    }
}

/// REPL 드라이버.
pub struct Repl<D: Dispatcher> {
    dispatcher: D,
    tree: Arc<CommandTree>,
    config: ReplConfig,
    ctx: DispatchContext,
    stack: Vec<SessionState>,
    shell: Arc<dyn SystemShell>,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl<D: Dispatcher> Repl<D> {
    pub fn new(dispatcher: D, config: ReplConfig, shell: Arc<dyn SystemShell>) -> Result<Self> {
        let prefixes = config
            .prefix_table()
            .context("invalid command prefixes in REPL config")?;
        let root = SessionState::new(
            config.prompt.clone(),
            InternalCommandSystem::new(prefixes),
            Box::new(InMemoryHistory::new()),
        );
        Ok(Self {
            tree: dispatcher.tree(),
            dispatcher,
            config,
            ctx: DispatchContext::new(),
            stack: vec![root],
            shell,
            sink: None,
        })
    }

    /// 기존 컨텍스트에서 REPL을 시작한다(상위 명령이 만든 상태를 이어받는다).
    pub fn with_context(mut self, ctx: DispatchContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_history(mut self, history: Box<dyn History>) -> Self {
        if let Some(root) = self.stack.first_mut() {
            root.history = history;
        }
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn on_startup(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        if let Some(root) = self.stack.first_mut() {
            root.on_startup = Some(Box::new(callback));
        }
        self
    }

    pub fn on_cleanup(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        if let Some(root) = self.stack.first_mut() {
            root.on_cleanup = Some(Box::new(callback));
        }
        self
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn phase(&self) -> Phase {
        self.stack.last().map(|s| s.phase).unwrap_or(Phase::Exiting)
    }

    pub fn current(&self) -> Option<&SessionState> {
        self.stack.last()
    }

    /// 최상위 레벨의 내부 명령 레지스트리.
    pub fn commands_mut(&mut self) -> Option<&mut InternalCommandSystem> {
        self.stack.first_mut().map(|s| &mut s.commands)
    }

    /// 모든 레벨이 끝날 때까지 줄을 읽고 실행한다.
    /// 읽기 오류는 모든 레벨을 정리한 뒤 돌려준다.
    pub async fn run(
        &mut self,
        reader: &mut dyn LineReader,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<()> {
        info!(prompt = %self.config.prompt, "repl started");

        while let Some(level) = self.stack.last_mut() {
            level.begin();
            level.phase = Phase::AwaitingLine;

            let outcome = {
                let level = &self.stack[self.stack.len() - 1];
                let assist = self.assist_for(level);
                let mut frame = PromptFrame::new(&level.prompt, level.history.entries(), assist);
                reader.read_line(&mut frame).await
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(read_err) => {
                    self.unwind_all();
                    return Err(read_err.context("failed to read REPL input"));
                }
            };

            match outcome {
                ReadOutcome::Eof | ReadOutcome::Interrupted => {
                    debug!(depth = self.stack.len(), "input closed or interrupted, unwinding all levels");
                    self.unwind_all();
                }
                ReadOutcome::Line(line) => {
                    if let Err(handle_err) = self.handle_line(&line, out, err) {
                        self.unwind_all();
                        return Err(handle_err);
                    }
                }
            }
        }

        info!("repl finished");
        Ok(())
    }

    fn assist_for(&self, level: &SessionState) -> LineAssist {
        let completer = Completer::new(Arc::clone(&self.tree), self.config.completion)
            .with_group_path(level.group_path.clone())
            .with_catalog(level.commands.catalog());
        let mut validator = Validator::new(Arc::clone(&self.tree), level.commands.prefixes().clone())
            .with_group_path(level.group_path.clone())
            .display_all_errors(self.config.display_all_errors);
        if let Some(sink) = &self.sink {
            validator = validator.with_error_sink(Arc::clone(sink));
        }

        let mut assist = LineAssist::new(completer, validator, StatusBar::new(self.config.status_bar));
        assist.complete_in_thread = self.config.complete_in_thread;
        assist.complete_while_typing = self.config.complete_while_typing;
        assist.refresh_interval = self.config.refresh_interval;
        assist.validation_mode = self.config.validation_mode;
        assist
    }

    fn handle_line(&mut self, raw: &str, out: &mut dyn Write, err: &mut dyn Write) -> Result<()> {
        let line = strip_comment(raw);
        if line.is_empty() {
            return Ok(());
        }

        let Some(level) = self.stack.last_mut() else {
            return Ok(());
        };
        if let Err(history_err) = level.history.append(raw.trim()) {
            warn!(error = %history_err, "failed to append history");
        }

        level.phase = Phase::Classifying;
        if let Some(result) = level.commands.handle_line(line, out, self.shell.as_ref()) {
            match result {
                Ok(InternalOutcome::Continue) => level.phase = Phase::AwaitingLine,
                Ok(InternalOutcome::Exit) => self.pop_level(),
                Err(internal_err) => {
                    writeln!(err, "{internal_err}")?;
                    level.phase = Phase::AwaitingLine;
                }
            }
            return Ok(());
        }

        level.phase = Phase::Dispatching;
        let mut args = level.group_path.clone();
        args.extend(split_args(line));
        debug!(?args, "dispatching line");

        let mut invocation = Invocation {
            ctx: &mut self.ctx,
            session: Some(level),
            out: &mut *out,
            err: &mut *err,
            nested: None,
        };
        let result = self.dispatcher.dispatch(&args, &mut invocation);
        let nested = invocation.nested.take();
        drop(invocation);

        match result {
            Ok(()) | Err(DispatchError::Exit) => {}
            Err(usage @ DispatchError::Usage { .. }) => writeln!(err, "{usage}")?,
            Err(DispatchError::Failed(failure)) => writeln!(err, "Error: {failure:#}")?,
        }
        out.flush()?;

        if let Some(level) = self.stack.last_mut() {
            level.phase = Phase::AwaitingLine;
        }
        if let Some(nested) = nested {
            self.push_level(nested);
        }
        Ok(())
    }

    fn push_level(&mut self, nested: NestedRepl) {
        let Some(parent) = self.stack.last() else {
            return;
        };
        let prompt = nested.prompt.unwrap_or_else(|| parent.prompt.clone());
        let history = nested
            .history
            .unwrap_or_else(|| Box::new(InMemoryHistory::seeded(parent.history.entries())));
        let mut group_path = parent.group_path.clone();
        group_path.extend(nested.group_path);

        let mut level = SessionState::new(prompt, parent.commands.clone(), history);
        level.group_path = group_path;
        level.on_startup = nested.on_startup;
        level.on_cleanup = nested.on_cleanup;
        debug!(depth = self.stack.len() + 1, "entering nested repl");
        self.stack.push(level);
    }

    fn pop_level(&mut self) {
        if let Some(mut level) = self.stack.pop() {
            level.exit();
        }
    }

    fn unwind_all(&mut self) {
        while !self.stack.is_empty() {
            self.pop_level();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::internal_commands::PrefixTable;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn context_ids_are_unique() {
        let a = DispatchContext::new();
        let b = DispatchContext::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn context_object_slot() {
        let mut ctx = DispatchContext::new();
        assert!(ctx.obj::<u32>().is_none());
        ctx.set_obj(5u32);
        *ctx.obj_mut::<u32>().unwrap() += 1;
        assert_eq!(ctx.obj::<u32>(), Some(&6));
        assert!(ctx.take_obj::<String>().is_none());
        assert_eq!(ctx.take_obj::<u32>(), Some(6));
        assert!(ctx.obj::<u32>().is_none());
    }

    #[test]
    fn cleanup_runs_once_only_after_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let mut state = SessionState::new(
            "> ",
            InternalCommandSystem::new(PrefixTable::default()),
            Box::new(InMemoryHistory::new()),
        );
        state.on_cleanup = Some(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        state.begin();
        state.exit();
        state.exit();
        drop(state);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let never = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&never);
        let mut idle = SessionState::new(
            "> ",
            InternalCommandSystem::new(PrefixTable::default()),
            Box::new(InMemoryHistory::new()),
        );
        idle.on_cleanup = Some(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        drop(idle);
        assert_eq!(never.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_shot_invocation_has_no_session() {
        let mut ctx = DispatchContext::new();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut inv = Invocation::one_shot(&mut ctx, &mut out, &mut err);
        assert!(!inv.in_repl());
        assert!(!inv.set_prompt("x> "));
        assert!(!inv.enter_repl(NestedRepl::new()));
        assert!(inv.history().is_empty());
    }

    #[test]
    fn history_is_append_only_without_dedup() {
        let mut history = InMemoryHistory::new();
        history.append("a").unwrap();
        history.append("a").unwrap();
        assert_eq!(history.entries(), ["a", "a"]);
    }
}
