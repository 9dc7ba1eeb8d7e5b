//! 입력 중인 줄에 대한 완성 후보 생성기.
//!
//! 후보는 단계별로 지연 계산된다: 내부 명령 → 옵션 플래그 → 값 슬롯 → 하위 명령 이름.
//! 값 슬롯에 사용자 정의 훅이 있으면 그 결과만 쓰고 내장 후보는 만들지 않는다.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::internal_commands::{InternalCatalog, PrefixKind};
use crate::domain::candidate::{Candidate, CandidateKind, HookRequest};
use crate::domain::param_type::{BOOL_FALSE_ALIASES, BOOL_TRUE_ALIASES, ParamType, PathKind};
use crate::domain::parser::{CurrentParam, ParseState};
use crate::domain::tokenizer::{before_cursor, expand_value, restore_prefix};
use crate::domain::tree::{CommandTree, Node, normalize_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub shortest_option_names_only: bool,
    pub show_only_unused_options: bool,
    pub show_hidden_commands: bool,
    pub show_hidden_params: bool,
}

/// 명령 트리와 내부 명령 목록으로 후보를 만든다. 스레드 간 공유가 가능하다.
#[derive(Debug, Clone)]
pub struct Completer {
    tree: Arc<CommandTree>,
    group_path: Vec<String>,
    options: CompletionOptions,
    catalog: Arc<InternalCatalog>,
}

impl Completer {
    pub fn new(tree: Arc<CommandTree>, options: CompletionOptions) -> Self {
        Self {
            tree,
            group_path: Vec::new(),
            options,
            catalog: Arc::new(InternalCatalog::default()),
        }
    }

    pub fn with_group_path(mut self, group_path: Vec<String>) -> Self {
        self.group_path = group_path;
        self
    }

    pub fn with_catalog(mut self, catalog: InternalCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub fn tree(&self) -> &Arc<CommandTree> {
        &self.tree
    }

    /// 커서 앞 텍스트를 해석한다.
    pub fn parse<'a>(&'a self, line: &str, cursor: usize) -> ParseState<'a> {
        ParseState::parse_at(&self.tree, &self.group_path, before_cursor(line, cursor))
    }

    /// 후보를 지연 생성하는 반복자.
    pub fn complete<'a>(&'a self, line: &str, cursor: usize) -> Completions<'a> {
        let text = before_cursor(line, cursor);

        if let Some((kind, prefix)) = self.catalog.prefixes.classify(text) {
            let source = match kind {
                PrefixKind::Internal => {
                    let typed = text.trim_start()[prefix.len()..].trim_start();
                    Source::Internal(typed.to_string())
                }
                PrefixKind::System => Source::Nothing,
            };
            return Completions::new(self, source, vec![Stage::InternalCommands]);
        }

        let state = self.parse(line, cursor);
        if state.error().is_some() {
            debug!(error = ?state.error(), "no completions for erroneous line");
            return Completions::new(self, Source::Nothing, Vec::new());
        }
        let stages = match state.command() {
            Some(command) if command.hidden && !self.options.show_hidden_commands => Vec::new(),
            Some(_) => vec![Stage::OptionFlags, Stage::ParamValues],
            None => vec![Stage::Children],
        };
        Completions::new(self, Source::Parsed(Box::new(state)), stages)
    }

    /// 취소 토큰을 확인하며 후보를 모두 모은다. 취소되면 None.
    pub fn collect(&self, line: &str, cursor: usize, cancel: &CancellationToken) -> Option<Vec<Candidate>> {
        let mut out = Vec::new();
        for candidate in self.complete(line, cursor) {
            if cancel.is_cancelled() {
                return None;
            }
            out.push(candidate);
        }
        (!cancel.is_cancelled()).then_some(out)
    }

    fn internal_candidates(&self, typed: &str) -> Vec<Candidate> {
        let typed = typed.trim_end().to_lowercase();
        let anchor = -(typed.chars().count() as isize);

        self.catalog
            .entries
            .iter()
            .filter_map(|entry| {
                let alias = entry
                    .aliases
                    .iter()
                    .find(|a| a.starts_with(&typed) && **a != typed)?;
                Some(
                    Candidate::new(alias.clone(), anchor, CandidateKind::Internal)
                        .with_display(entry.aliases.join("/"))
                        .with_help(Some(entry.description.clone())),
                )
            })
            .collect()
    }

    fn option_candidates(&self, state: &ParseState<'_>) -> Vec<Candidate> {
        let Some(command) = state.command() else {
            return Vec::new();
        };
        let wants_flags = !state.double_dash()
            && match state.current_param() {
                None => true,
                Some(current) => {
                    current.param.is_argument()
                        && current.received == 0
                        && state
                            .values_of(current.index)
                            .is_none_or(|v| v.values.is_empty())
                }
            };
        if !wants_flags {
            return Vec::new();
        }

        let incomplete = state.incomplete();
        let typed = incomplete.text.as_str();
        let anchor = incomplete.anchor();
        let shortest_only = self.options.shortest_option_names_only && typed.is_empty();
        let mut out = Vec::new();

        for (index, option) in command.params.iter().enumerate() {
            if !option.is_option() || (option.hidden && !self.options.show_hidden_params) {
                continue;
            }
            let already_used = !state.is_param_incomplete(index);
            if option.is_flag && already_used {
                continue;
            }
            if self.options.show_only_unused_options && already_used && !option.repeatable() {
                continue;
            }

            let is_bool = option.is_flag && matches!(option.ty, ParamType::Bool);
            if shortest_only && is_bool && !option.secondary().is_empty() {
                for (flags, on) in [(option.flags(), true), (option.secondary(), false)] {
                    if let Some(shortest) = shortest_flag(flags) {
                        out.push(
                            Candidate::new(shortest, anchor, CandidateKind::BoolFlag(on))
                                .with_display(flags.join("/"))
                                .with_help(option.help.clone()),
                        );
                    }
                }
                continue;
            }

            let matching: Vec<&String> = option.all_flags().filter(|f| f.starts_with(typed)).collect();
            if matching.is_empty() {
                continue;
            }
            let kind_of = |flag: &str| {
                if is_bool {
                    CandidateKind::BoolFlag(!option.secondary().iter().any(|f| f == flag))
                } else {
                    CandidateKind::Option
                }
            };

            if shortest_only {
                let joined = matching.iter().map(|f| f.as_str()).collect::<Vec<_>>().join("/");
                if let Some(shortest) = matching.iter().min_by_key(|f| f.len()) {
                    out.push(
                        Candidate::new((*shortest).clone(), anchor, kind_of(shortest.as_str()))
                            .with_display(joined)
                            .with_help(option.help.clone()),
                    );
                }
                continue;
            }

            for flag in matching {
                out.push(Candidate::new(flag.clone(), anchor, kind_of(flag.as_str())).with_help(option.help.clone()));
            }
        }
        out
    }

    fn value_candidates(&self, state: &ParseState<'_>) -> Vec<Candidate> {
        let Some(current) = state.current_param() else {
            return Vec::new();
        };
        if current.param.hidden && !self.options.show_hidden_params {
            return Vec::new();
        }

        if let Some(hook) = &current.param.completer {
            let request = HookRequest {
                param: current.param,
                args: state.args(),
                incomplete: &state.incomplete().text,
            };
            return match hook.call(&request) {
                Ok(items) => items
                    .into_iter()
                    .map(|item| {
                        Candidate::new(item.value, state.incomplete().anchor(), CandidateKind::Value)
                            .with_help(item.help)
                    })
                    .collect(),
                Err(err) => {
                    warn!(param = %current.param.name, %err, "completion hook failed");
                    vec![Candidate::error(err.to_string())]
                }
            };
        }

        type_candidates(current, state)
    }

    fn child_candidates(&self, state: &ParseState<'_>) -> Vec<Candidate> {
        let incomplete = state.incomplete();
        let typed = normalize_name(&incomplete.text);
        let anchor = incomplete.anchor();

        state
            .group()
            .visible_children(self.options.show_hidden_commands)
            .filter_map(|child| {
                let name = normalize_name(child.name());
                if !name.starts_with(&typed) {
                    return None;
                }
                let kind = match child {
                    Node::Group(_) => CandidateKind::Group,
                    Node::Command(_) => CandidateKind::Command,
                };
                Some(Candidate::new(name, anchor, kind).with_help(child.help()))
            })
            .collect()
    }
}

/// 값 슬롯의 타입별 내장 완성.
fn type_candidates(current: &CurrentParam<'_>, state: &ParseState<'_>) -> Vec<Candidate> {
    let incomplete = state.incomplete();
    let anchor = incomplete.anchor();
    let ty = current.param.ty.element(current.received);

    match ty {
        ParamType::Choice {
            choices,
            case_sensitive,
        } => {
            let expanded = incomplete.expanded();
            choices
                .iter()
                .filter(|choice| {
                    if *case_sensitive {
                        choice.starts_with(&expanded)
                    } else {
                        choice.to_lowercase().starts_with(&expanded.to_lowercase())
                    }
                })
                .map(|choice| Candidate::new(choice.clone(), anchor, CandidateKind::Value))
                .collect()
        }
        ParamType::Bool => {
            let expanded = incomplete.expanded().to_lowercase();
            [("true", &BOOL_TRUE_ALIASES, true), ("false", &BOOL_FALSE_ALIASES, false)]
                .into_iter()
                .filter(|(_, aliases, _)| aliases.iter().any(|a| a.starts_with(&expanded)))
                .map(|(value, aliases, on)| {
                    Candidate::new(value, anchor, CandidateKind::BoolFlag(on))
                        .with_help(Some(aliases.join("/")))
                })
                .collect()
        }
        ParamType::Path { kind, .. } => path_candidates(&incomplete.text, anchor, *kind == PathKind::Dir),
        ParamType::File => path_candidates(&incomplete.text, anchor, false),
        _ => Vec::new(),
    }
}

/// 입력 중인 경로의 디렉터리를 읽어 파일 이름 접두어로 거른다.
fn path_candidates(typed: &str, anchor: isize, dirs_only: bool) -> Vec<Candidate> {
    let expanded = expand_value(typed);
    if expanded.contains('*') {
        return Vec::new();
    }
    let expanded = expanded.trim_matches(|c| c == '"' || c == '\'').to_string();

    let (dir_part, name_prefix) = match expanded.rfind(std::path::MAIN_SEPARATOR) {
        Some(idx) => expanded.split_at(idx + 1),
        None => ("", expanded.as_str()),
    };
    let dir = if dir_part.is_empty() {
        Path::new(".")
    } else {
        Path::new(dir_part)
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), %err, "path completion skipped");
            return Vec::new();
        }
    };

    let mut found: Vec<(String, bool)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(name_prefix) || (name.starts_with('.') && !name_prefix.starts_with('.')) {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if dirs_only && !is_dir {
                return None;
            }
            Some((name, is_dir))
        })
        .collect();
    found.sort();

    found
        .into_iter()
        .map(|(name, is_dir)| {
            let full = restore_prefix(typed, &expanded, &format!("{dir_part}{name}"));
            let kind = if is_dir {
                CandidateKind::Directory
            } else {
                CandidateKind::File
            };
            Candidate::new(full, anchor, kind).with_display(name)
        })
        .collect()
}

fn shortest_flag(flags: &[String]) -> Option<String> {
    flags.iter().min_by_key(|f| f.len()).cloned()
}

enum Source<'a> {
    Internal(String),
    Parsed(Box<ParseState<'a>>),
    Nothing,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    InternalCommands,
    OptionFlags,
    ParamValues,
    Children,
}

/// 단계별로 후보를 계산하는 반복자. 다음 단계는 앞 단계 후보를 다 꺼낸 뒤에 계산된다.
pub struct Completions<'a> {
    completer: &'a Completer,
    source: Source<'a>,
    stages: VecDeque<Stage>,
    buffer: VecDeque<Candidate>,
}

impl<'a> Completions<'a> {
    fn new(completer: &'a Completer, source: Source<'a>, stages: Vec<Stage>) -> Self {
        Self {
            completer,
            source,
            stages: stages.into(),
            buffer: VecDeque::new(),
        }
    }

    fn run(&self, stage: Stage) -> Vec<Candidate> {
        match (&self.source, stage) {
            (Source::Internal(typed), Stage::InternalCommands) => self.completer.internal_candidates(typed),
            (Source::Parsed(state), Stage::OptionFlags) => self.completer.option_candidates(state),
            (Source::Parsed(state), Stage::ParamValues) => self.completer.value_candidates(state),
            (Source::Parsed(state), Stage::Children) => self.completer.child_candidates(state),
            _ => Vec::new(),
        }
    }
}

impl Iterator for Completions<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            let stage = self.stages.pop_front()?;
            let batch = self.run(stage);
            self.buffer.extend(batch);
        }
    }
}

/// 작업 스레드에서 끝난 완성 결과.
#[derive(Debug, Clone)]
pub struct CompletionBatch {
    pub generation: u64,
    pub candidates: Vec<Candidate>,
}

/// 완성 계산을 블로킹 작업 스레드로 넘긴다.
/// 새 요청은 진행 중인 이전 요청을 취소하고, 세대가 다른 결과는 버려진다.
pub struct CompletionWorker {
    completer: Arc<Completer>,
    generation: Arc<AtomicU64>,
    inflight: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<CompletionBatch>,
}

impl CompletionWorker {
    pub fn new(completer: Arc<Completer>) -> (Self, mpsc::UnboundedReceiver<CompletionBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                completer,
                generation: Arc::new(AtomicU64::new(0)),
                inflight: None,
                tx,
            },
            rx,
        )
    }

    /// 새 완성 요청을 보낸다. 반환값은 이 요청의 세대 번호다.
    pub fn request(&mut self, line: &str, cursor: usize) -> u64 {
        self.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        self.inflight = Some(token.clone());

        let completer = Arc::clone(&self.completer);
        let tx = self.tx.clone();
        let line = line.to_string();
        tokio::task::spawn_blocking(move || {
            if let Some(candidates) = completer.collect(&line, cursor, &token) {
                let _ = tx.send(CompletionBatch {
                    generation,
                    candidates,
                });
            }
        });
        generation
    }

    /// 진행 중인 요청을 취소하고 세대를 넘긴다.
    /// 이미 채널에 들어간 결과도 `is_current`에서 걸러진다.
    pub fn cancel(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_current(&self, batch: &CompletionBatch) -> bool {
        batch.generation == self.generation.load(Ordering::SeqCst)
    }
}

impl Drop for CompletionWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::internal_commands::{InternalCommandSystem, PrefixTable};
    use crate::domain::candidate::{CompletionHook, CompletionItem, HookError};
    use crate::domain::tree::{Command, Group, Parameter};
    use pretty_assertions::assert_eq;

    fn tree() -> Arc<CommandTree> {
        let root = Group::new("school")
            .command(
                Command::new("get_marks")
                    .help("Show marks")
                    .param(Parameter::option("student_name", ["--student-name", "-s"]).help("Student"))
                    .param(Parameter::option("subject", ["--subject"]).ty(ParamType::choice(["math", "art"])))
                    .param(Parameter::flag("verbose", ["--verbose", "-v"]))
                    .param(Parameter::flag("color", ["--color"]).secondary_flags(["--no-color"]))
                    .param(Parameter::option("tag", ["--tag"]).multiple())
                    .param(Parameter::option("secret", ["--secret"]).hidden()),
            )
            .command(Command::new("set_mode").param(Parameter::argument("on").ty(ParamType::Bool)))
            .command(
                Command::new("pick").param(
                    Parameter::argument("fruit")
                        .completer(CompletionHook::from_values(["apple", "apricot", "banana"])),
                ),
            )
            .command(
                Command::new("broken").param(
                    Parameter::argument("x").completer(CompletionHook::new(|_| {
                        Err(HookError::Failed("backend offline".to_string()))
                    })),
                ),
            )
            .command(
                Command::new("pair").param(
                    Parameter::argument("pair")
                        .ty(ParamType::Tuple(vec![ParamType::Integer, ParamType::choice(["x", "y"])])),
                ),
            )
            .command(Command::new("debug_dump").hidden().param(Parameter::flag("all", ["--all"])))
            .group(Group::new("admin").help("Admin tools").command(Command::new("reset")));
        Arc::new(CommandTree::new(root).unwrap())
    }

    fn completer(options: CompletionOptions) -> Completer {
        Completer::new(tree(), options)
    }

    fn texts(completer: &Completer, line: &str) -> Vec<String> {
        completer.complete(line, line.len()).map(|c| c.text).collect()
    }

    #[test]
    fn command_name_prefix_yields_single_candidate() {
        let c = completer(CompletionOptions::default());
        let got: Vec<Candidate> = c.complete("get-mar", 7).collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "get-marks");
        assert_eq!(got[0].start, -7);
        assert_eq!(got[0].help.as_deref(), Some("Show marks"));
    }

    #[test]
    fn hidden_commands_are_not_suggested_by_default() {
        let c = completer(CompletionOptions::default());
        assert!(!texts(&c, "").contains(&"debug-dump".to_string()));
        assert!(texts(&c, "").contains(&"admin".to_string()));

        let shown = completer(CompletionOptions {
            show_hidden_commands: true,
            ..Default::default()
        });
        assert!(texts(&shown, "deb").contains(&"debug-dump".to_string()));
    }

    #[test]
    fn hidden_current_command_yields_nothing() {
        let c = completer(CompletionOptions::default());
        assert!(texts(&c, "debug-dump --").is_empty());
    }

    #[test]
    fn used_option_is_hidden_only_when_configured() {
        let line = "get-marks --student-name bob --s";
        let all = completer(CompletionOptions::default());
        assert_eq!(texts(&all, line), vec!["--student-name", "--subject"]);

        let unused = completer(CompletionOptions {
            show_only_unused_options: true,
            ..Default::default()
        });
        assert_eq!(texts(&unused, line), vec!["--subject"]);
    }

    #[test]
    fn used_flags_and_hidden_params_are_skipped() {
        let c = completer(CompletionOptions::default());
        let got = texts(&c, "get-marks -v --");
        assert!(!got.contains(&"--verbose".to_string()));
        assert!(!got.contains(&"--secret".to_string()));
        assert!(got.contains(&"--tag".to_string()));
    }

    #[test]
    fn shortest_names_join_bool_flag_groups() {
        let c = completer(CompletionOptions {
            shortest_option_names_only: true,
            ..Default::default()
        });
        let got: Vec<Candidate> = c.complete("get-marks ", 10).collect();
        let color: Vec<&Candidate> = got
            .iter()
            .filter(|c| matches!(c.kind, CandidateKind::BoolFlag(_)) && c.text.contains("color"))
            .collect();
        assert_eq!(color.len(), 2);
        assert_eq!(color[0].text, "--color");
        assert_eq!(color[1].text, "--no-color");
        assert_eq!(color[1].kind, CandidateKind::BoolFlag(false));

        let student = got.iter().find(|c| c.display == "--student-name/-s").unwrap();
        assert_eq!(student.text, "-s");
    }

    #[test]
    fn choice_values_for_pending_option() {
        let c = completer(CompletionOptions::default());
        assert_eq!(texts(&c, "get-marks --subject "), vec!["math", "art"]);
        assert_eq!(texts(&c, "get-marks --subject a"), vec!["art"]);
        assert_eq!(texts(&c, "get-marks --subject=m"), vec!["math"]);
    }

    #[test]
    fn bool_argument_offers_true_and_false() {
        let c = completer(CompletionOptions::default());
        let got: Vec<Candidate> = c.complete("set-mode y", 10).collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "true");
        assert_eq!(got[0].help.as_deref(), Some("1/true/t/yes/y/on"));
    }

    #[test]
    fn hook_candidates_replace_builtin_values() {
        let c = completer(CompletionOptions::default());
        assert_eq!(texts(&c, "pick ap"), vec!["apple", "apricot"]);
    }

    #[test]
    fn hook_errors_become_error_candidate() {
        let c = completer(CompletionOptions::default());
        let got: Vec<Candidate> = c.complete("broken x", 8).collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, CandidateKind::Error);
        assert_eq!(got[0].display, "backend offline");
    }

    #[test]
    fn hook_panic_is_caught() {
        let root = Group::new("r").command(Command::new("boom").param(
            Parameter::argument("x").completer(CompletionHook::new(|_| -> Result<Vec<CompletionItem>, HookError> {
                panic!("kaboom")
            })),
        ));
        let c = Completer::new(Arc::new(CommandTree::new(root).unwrap()), CompletionOptions::default());
        let got: Vec<Candidate> = c.complete("boom ", 5).collect();
        assert_eq!(got[0].kind, CandidateKind::Error);
        assert!(got[0].display.contains("kaboom"));
    }

    #[test]
    fn tuple_uses_element_type_of_next_value() {
        let c = completer(CompletionOptions::default());
        assert!(texts(&c, "pair ").is_empty());
        assert_eq!(texts(&c, "pair 3 "), vec!["x", "y"]);
    }

    #[test]
    fn group_children_after_descending() {
        let c = completer(CompletionOptions::default());
        assert_eq!(texts(&c, "admin "), vec!["reset"]);
        let nested = Completer::new(tree(), CompletionOptions::default()).with_group_path(vec!["admin".into()]);
        assert_eq!(texts(&nested, "re"), vec!["reset"]);
    }

    #[test]
    fn internal_command_completion() {
        let system = InternalCommandSystem::new(PrefixTable::default());
        let c = completer(CompletionOptions::default()).with_catalog(system.catalog());

        let got: Vec<Candidate> = c.complete(":qu", 3).collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "quit");
        assert_eq!(got[0].display, "q/quit/exit");
        assert_eq!(got[0].start, -2);

        assert!(texts(&c, "!ls").is_empty());
    }

    #[test]
    fn path_completion_lists_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("reports")).unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();

        let typed = format!("{}/re", dir.path().display());
        let got = path_candidates(&typed, -3, false);
        let names: Vec<&str> = got.iter().map(|c| c.display.as_str()).collect();
        assert_eq!(names, vec!["readme.txt", "reports"]);
        assert_eq!(got[1].kind, CandidateKind::Directory);
        assert_eq!(got[1].text, format!("{}/reports", dir.path().display()));

        let dirs = path_candidates(&typed, -3, true);
        assert_eq!(dirs.len(), 1);
        assert!(path_candidates(&format!("{}/*", dir.path().display()), 0, false).is_empty());
    }

    #[test]
    fn cancelled_collection_returns_none() {
        let c = completer(CompletionOptions::default());
        let token = CancellationToken::new();
        assert!(c.collect("get", 3, &token).is_some());
        token.cancel();
        assert!(c.collect("get", 3, &token).is_none());
    }

    #[tokio::test]
    async fn worker_discards_stale_generations() {
        let (mut worker, mut rx) = CompletionWorker::new(Arc::new(completer(CompletionOptions::default())));
        let first = worker.request("get", 3);
        let second = worker.request("adm", 3);
        assert!(second > first);

        loop {
            let batch = rx.recv().await.unwrap();
            if worker.is_current(&batch) {
                assert_eq!(batch.candidates[0].text, "admin");
                break;
            }
        }
    }

    #[tokio::test]
    async fn cancelled_request_is_no_longer_current() {
        let (mut worker, _rx) = CompletionWorker::new(Arc::new(completer(CompletionOptions::default())));
        let generation = worker.request("get", 3);
        let batch = CompletionBatch {
            generation,
            candidates: Vec::new(),
        };
        assert!(worker.is_current(&batch));

        worker.cancel();
        assert!(!worker.is_current(&batch));
        assert!(worker.request("adm", 3) > generation);
    }
}
