//! 스크립트 입력으로 성적부 REPL 전체 흐름을 돌려본다.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use replpilot::application::assist::PromptFrame;
use replpilot::application::config::ReplConfig;
use replpilot::application::ports::{Dispatcher, LineReader, ReadOutcome, ShellStatus, SystemShell};
use replpilot::application::session::Repl;
use replpilot::infrastructure::clap_tree::ClapDispatcher;
use replpilot::interface::cli::school_dispatcher;

enum Step {
    Line(&'static str),
    Complete(&'static str),
    Interrupt,
    Fail,
}

/// 미리 정한 입력을 차례로 돌려주고, 읽을 때마다 프롬프트와 이력을 기록한다.
#[derive(Default)]
struct ScriptedReader {
    steps: VecDeque<Step>,
    prompts: Vec<String>,
    last_history: Vec<String>,
    completions: Vec<Vec<String>>,
}

impl ScriptedReader {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ..Self::default()
        }
    }
}

#[async_trait(?Send)]
impl LineReader for ScriptedReader {
    async fn read_line(&mut self, frame: &mut PromptFrame<'_>) -> Result<ReadOutcome> {
        self.prompts.push(frame.prompt.to_string());
        self.last_history = frame.history.to_vec();
        loop {
            match self.steps.pop_front() {
                None => return Ok(ReadOutcome::Eof),
                Some(Step::Line(line)) => return Ok(ReadOutcome::Line(line.to_string())),
                Some(Step::Interrupt) => return Ok(ReadOutcome::Interrupted),
                Some(Step::Fail) => return Err(anyhow!("terminal went away")),
                Some(Step::Complete(line)) => {
                    let texts = frame
                        .assist
                        .complete(line, line.len())
                        .into_iter()
                        .map(|c| c.text)
                        .collect();
                    self.completions.push(texts);
                }
            }
        }
    }
}

/// 실행된 쉘 명령을 기록한다. `fail`로 시작하면 종료 코드 3을 돌려준다.
#[derive(Default)]
struct RecordingShell {
    commands: Mutex<Vec<String>>,
}

impl SystemShell for RecordingShell {
    fn run(&self, command: &str, out: &mut dyn Write) -> Result<ShellStatus> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }
        if command.starts_with("fail") {
            return Ok(ShellStatus {
                success: false,
                code: Some(3),
            });
        }
        writeln!(out, "ran {command}")?;
        Ok(ShellStatus {
            success: true,
            code: Some(0),
        })
    }
}

struct Outcome {
    result: Result<()>,
    out: String,
    err: String,
    reader: ScriptedReader,
    startups: usize,
    cleanups: usize,
}

fn school_repl(shell: Arc<RecordingShell>) -> (Repl<ClapDispatcher>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let startups = Arc::new(AtomicUsize::new(0));
    let cleanups = Arc::new(AtomicUsize::new(0));
    let (s, c) = (Arc::clone(&startups), Arc::clone(&cleanups));
    let repl = Repl::new(school_dispatcher().unwrap(), ReplConfig::default(), shell)
        .unwrap()
        .on_startup(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_cleanup(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
    (repl, startups, cleanups)
}

async fn run_script(steps: Vec<Step>) -> Outcome {
    run_script_with(steps, Arc::new(RecordingShell::default())).await
}

async fn run_script_with(steps: Vec<Step>, shell: Arc<RecordingShell>) -> Outcome {
    let (mut repl, startups, cleanups) = school_repl(shell);
    let mut reader = ScriptedReader::new(steps);
    let mut out = Vec::new();
    let mut err = Vec::new();
    let result = repl.run(&mut reader, &mut out, &mut err).await;
    assert_eq!(repl.depth(), 0);
    Outcome {
        result,
        out: String::from_utf8(out).unwrap(),
        err: String::from_utf8(err).unwrap(),
        reader,
        startups: startups.load(Ordering::SeqCst),
        cleanups: cleanups.load(Ordering::SeqCst),
    }
}

#[tokio::test]
async fn exit_command_runs_lifecycle_hooks_once() {
    let outcome = run_script(vec![Step::Line(":exit"), Step::Line("inspect")]).await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.startups, 1);
    assert_eq!(outcome.cleanups, 1);
    assert_eq!(outcome.reader.prompts.len(), 1);
    assert_eq!(outcome.out, "");
}

#[tokio::test]
async fn end_of_input_leaves_the_shell() {
    let outcome = run_script(vec![]).await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.cleanups, 1);
}

#[tokio::test]
async fn commands_share_one_context_across_lines() {
    let outcome = run_script(vec![
        Step::Line("set-marks -s alice maths 90"),
        Step::Line("set-marks -s alice science 70"),
        Step::Line("get_marks -s alice -v"),
    ])
    .await;
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        outcome.out,
        "alice: maths = 90\nalice: science = 70\nmaths: 90\nscience: 70\naverage: 80.0\n"
    );
    assert_eq!(outcome.err, "");
}

#[tokio::test]
async fn context_identity_is_stable_in_repl_and_fresh_per_one_shot() {
    let outcome = run_script(vec![Step::Line("inspect"), Step::Line("inspect")]).await;
    let ids: Vec<&str> = outcome
        .out
        .lines()
        .filter(|l| l.starts_with("context: "))
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);

    let dispatcher = school_dispatcher().unwrap();
    let args = vec!["inspect".to_string()];
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let first = dispatcher.invoke_once(&args, &mut out, &mut err).unwrap();
    let second = dispatcher.invoke_once(&args, &mut out, &mut err).unwrap();
    assert_ne!(first.id(), second.id());
    // 단발 실행에는 프롬프트가 없다.
    assert!(!String::from_utf8(out).unwrap().contains("prompt:"));
}

#[tokio::test]
async fn nested_level_scopes_commands_and_restores_prompt() {
    let outcome = run_script(vec![
        Step::Line("class add 5a alice bob"),
        Step::Line("class enter 5a"),
        Step::Complete("l"),
        Step::Line("list"),
        Step::Line(":q"),
        Step::Line("class list"),
    ])
    .await;
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        outcome.reader.prompts,
        vec!["> ", "> ", "school/5a> ", "school/5a> ", "> ", "> "]
    );
    assert_eq!(outcome.reader.completions, vec![vec!["list".to_string()]]);
    assert_eq!(
        outcome.out,
        "5a: 2 students\nentering 5a (type :q to leave)\n5a: alice, bob\n5a: alice, bob\n"
    );
    // 바깥 레벨의 훅만 등록했으므로 한 번씩만 불린다.
    assert_eq!(outcome.startups, 1);
    assert_eq!(outcome.cleanups, 1);
}

#[tokio::test]
async fn interrupt_unwinds_every_level() {
    let outcome = run_script(vec![
        Step::Line("class enter 5a"),
        Step::Interrupt,
        Step::Line("inspect"),
    ])
    .await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.reader.prompts.len(), 2);
    assert_eq!(outcome.cleanups, 1);
    assert!(!outcome.out.contains("context:"));
}

#[tokio::test]
async fn end_of_input_unwinds_every_level() {
    let outcome = run_script(vec![
        Step::Line("class add 5a alice"),
        Step::Line("class enter 5a"),
    ])
    .await;
    assert!(outcome.result.is_ok());
    // 중첩 레벨에서 입력이 끝나면 바깥 프롬프트로 돌아가지 않는다.
    assert_eq!(outcome.reader.prompts, vec!["> ", "> ", "school/5a> "]);
    assert_eq!(outcome.cleanups, 1);
}

#[tokio::test]
async fn reader_failure_unwinds_and_propagates() {
    let outcome = run_script(vec![Step::Line("class enter 5a"), Step::Fail]).await;
    let err = outcome.result.unwrap_err();
    assert!(format!("{err:#}").contains("failed to read REPL input"));
    assert!(format!("{err:#}").contains("terminal went away"));
    assert_eq!(outcome.cleanups, 1);
}

#[tokio::test]
async fn usage_and_handler_errors_do_not_end_the_session() {
    let outcome = run_script(vec![
        Step::Line("set-marks -s alice art 10"),
        Step::Line("get-marks -s nobody"),
        Step::Line(":nope"),
        Step::Line("inspect"),
    ])
    .await;
    assert!(outcome.result.is_ok());
    let lines: Vec<&str> = outcome.err.lines().collect();
    assert!(
        lines[0].starts_with("school set-marks: invalid value 'art'"),
        "{}",
        lines[0]
    );
    assert!(outcome.err.contains("Error: no marks recorded for 'nobody'\n"));
    assert!(outcome.err.contains("no internal command named 'nope'\n"));
    assert!(outcome.out.contains("context: "));
}

#[tokio::test]
async fn help_output_goes_to_stdout() {
    let outcome = run_script(vec![Step::Line("get-marks --help")]).await;
    assert!(outcome.result.is_ok());
    assert!(outcome.out.contains("Usage:"));
    assert_eq!(outcome.err, "");
}

#[tokio::test]
async fn system_escape_runs_through_the_shell() {
    let shell = Arc::new(RecordingShell::default());
    let outcome = run_script_with(
        vec![Step::Line("!echo hi"), Step::Line("!fail now"), Step::Line("!")],
        Arc::clone(&shell),
    )
    .await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.out, "ran echo hi\n");
    assert_eq!(
        outcome.err,
        "system command exited with status 3\nEnter a proper system command.\n"
    );
    assert_eq!(*shell.commands.lock().unwrap(), vec!["echo hi", "fail now"]);
}

#[tokio::test]
async fn blank_and_comment_lines_are_skipped_but_history_keeps_the_rest() {
    let outcome = run_script(vec![
        Step::Line("   "),
        Step::Line("# just a note"),
        Step::Line("class list # trailing"),
        Step::Line("class list # trailing"),
    ])
    .await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.out, "no classes yet\nno classes yet\n");
    assert_eq!(
        outcome.reader.last_history,
        vec!["class list # trailing", "class list # trailing"]
    );
}

#[tokio::test]
async fn completion_offers_options_and_internal_commands() {
    let outcome = run_script(vec![
        Step::Complete("get-marks --st"),
        Step::Complete(":cl"),
        Step::Complete("set-marks -s alice "),
    ])
    .await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.reader.completions[0], vec!["--student-name"]);
    assert!(outcome.reader.completions[1].contains(&"cls".to_string()));
    // 값 슬롯 앞에서는 아직 쓸 수 있는 옵션도 함께 나온다.
    let (flags, values): (Vec<&String>, Vec<&String>) = outcome.reader.completions[2]
        .iter()
        .partition(|text| text.starts_with('-'));
    assert!(flags.iter().any(|f| *f == "--overwrite"));
    assert_eq!(values, vec!["maths", "science", "english", "history"]);
}
