//! 데모 애플리케이션(성적부) CLI 정의와 핸들러.
//!
//! 같은 clap 정의가 단발 실행과 REPL 양쪽에서 쓰인다.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;

use crate::application::session::{Invocation, NestedRepl};
use crate::domain::candidate::{CompletionHook, CompletionItem};
use crate::domain::param_type::ParamType;
use crate::infrastructure::clap_tree::{ClapDispatcher, from_clap_with};

pub const MAX_MARK: u8 = 100;

#[derive(Debug, Parser)]
#[command(name = "school")]
#[command(about = "Grade book with an interactive shell")]
pub struct SchoolCli {
    #[command(subcommand)]
    pub command: Option<SchoolCommand>,
}

#[derive(Debug, Subcommand)]
pub enum SchoolCommand {
    /// Show the marks of a student
    GetMarks(GetMarksArgs),
    /// Record a mark for a student
    SetMarks(SetMarksArgs),
    /// Write the grade book as JSON
    Export(ExportArgs),
    /// Manage class rosters
    #[command(subcommand)]
    Class(ClassCommand),
    /// Print session internals
    #[command(hide = true)]
    Inspect,
}

#[derive(Debug, Args)]
pub struct GetMarksArgs {
    /// Student to look up
    #[arg(long, short = 's')]
    pub student_name: String,
    /// Only this subject
    pub subject: Option<Subject>,
    /// Also print the average
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Args)]
pub struct SetMarksArgs {
    /// Student to update
    #[arg(long, short = 's')]
    pub student_name: String,
    pub subject: Subject,
    pub marks: u8,
    /// Replace an existing mark
    #[arg(long, short = 'f')]
    pub overwrite: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    pub path: PathBuf,
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Subcommand)]
pub enum ClassCommand {
    /// List classes and their students
    List,
    /// Add students to a class
    Add {
        class: String,
        #[arg(required = true, num_args = 1..)]
        students: Vec<String>,
    },
    /// Open a shell scoped to the class commands
    Enter { class: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Maths,
    Science,
    English,
    History,
}

impl Subject {
    pub fn name(self) -> &'static str {
        match self {
            Self::Maths => "maths",
            Self::Science => "science",
            Self::English => "english",
            Self::History => "history",
        }
    }
}

/// 세션 컨텍스트(`obj`)에 보관되는 성적부.
#[derive(Debug, Default, Serialize)]
pub struct GradeBook {
    pub marks: BTreeMap<String, BTreeMap<Subject, u8>>,
    pub classes: BTreeMap<String, BTreeSet<String>>,
}

/// 완성 훅과 핸들러가 함께 보는 학생 이름 목록.
pub type Roster = Arc<Mutex<BTreeSet<String>>>;

fn grade_book<'a>(inv: &'a mut Invocation<'_>) -> Result<&'a mut GradeBook> {
    let ctx = inv.ctx_mut();
    if ctx.obj::<GradeBook>().is_none() {
        ctx.set_obj(GradeBook::default());
    }
    ctx.obj_mut::<GradeBook>()
        .context("session object is not a grade book")
}

fn remember(roster: &Roster, name: &str) {
    let mut names = roster.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    names.insert(name.to_string());
}

fn roster_hook(roster: Roster) -> CompletionHook {
    CompletionHook::new(move |request| {
        let names = roster.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(names
            .iter()
            .filter(|name| name.starts_with(request.incomplete))
            .map(|name| CompletionItem::new(name.clone()).with_help("student"))
            .collect())
    })
}

/// 성적부 명령 전체를 clap 디스패처로 조립한다.
pub fn school_dispatcher() -> Result<ClapDispatcher> {
    school_dispatcher_with(Arc::new(Mutex::new(BTreeSet::new())))
}

pub fn school_dispatcher_with(roster: Roster) -> Result<ClapDispatcher> {
    let command = SchoolCli::command();
    let hook = roster_hook(Arc::clone(&roster));
    let tree = from_clap_with(&command, |path, param| {
        match (path, param.name.as_str()) {
            (_, "student_name") => param.completer = Some(hook.clone()),
            (["set-marks"], "marks") => {
                param.ty = ParamType::IntRange {
                    min: Some(0),
                    max: Some(i64::from(MAX_MARK)),
                }
            }
            _ => {}
        }
    })
    .context("invalid school command tree")?;

    let set_roster = Arc::clone(&roster);
    let class_roster = Arc::clone(&roster);
    Ok(ClapDispatcher::with_tree(command, tree)
        .handler("get-marks", |m, inv| get_marks(&GetMarksArgs::from_arg_matches(m)?, inv))
        .handler("set-marks", move |m, inv| {
            let args = SetMarksArgs::from_arg_matches(m)?;
            remember(&set_roster, &args.student_name);
            set_marks(&args, inv)
        })
        .handler("export", |m, inv| export(&ExportArgs::from_arg_matches(m)?, inv))
        .handler("class list", |_, inv| class_list(inv))
        .handler("class add", move |m, inv| {
            let class = m.get_one::<String>("class").cloned().unwrap_or_default();
            let students: Vec<String> = m.get_many::<String>("students").into_iter().flatten().cloned().collect();
            for student in &students {
                remember(&class_roster, student);
            }
            class_add(&class, students, inv)
        })
        .handler("class enter", |m, inv| {
            let class = m.get_one::<String>("class").cloned().unwrap_or_default();
            class_enter(&class, inv)
        })
        .handler("inspect", |_, inv| inspect(inv)))
}

fn get_marks(args: &GetMarksArgs, inv: &mut Invocation<'_>) -> Result<()> {
    let report = {
        let book = grade_book(inv)?;
        let Some(marks) = book.marks.get(&args.student_name) else {
            bail!("no marks recorded for '{}'", args.student_name);
        };

        let mut lines: Vec<String> = marks
            .iter()
            .filter(|(subject, _)| args.subject.is_none_or(|wanted| wanted == **subject))
            .map(|(subject, mark)| format!("{}: {mark}", subject.name()))
            .collect();
        if lines.is_empty() {
            bail!("no matching marks for '{}'", args.student_name);
        }
        if args.verbose > 0 {
            let total: u32 = marks.values().map(|m| u32::from(*m)).sum();
            lines.push(format!("average: {:.1}", f64::from(total) / marks.len() as f64));
        }
        lines
    };

    for line in report {
        writeln!(inv.out, "{line}")?;
    }
    Ok(())
}

fn set_marks(args: &SetMarksArgs, inv: &mut Invocation<'_>) -> Result<()> {
    if args.marks > MAX_MARK {
        bail!("marks must be between 0 and {MAX_MARK}");
    }
    let previous = {
        let book = grade_book(inv)?;
        let marks = book.marks.entry(args.student_name.clone()).or_default();
        if marks.contains_key(&args.subject) && !args.overwrite {
            bail!(
                "'{}' already has a {} mark (use --overwrite)",
                args.student_name,
                args.subject.name()
            );
        }
        marks.insert(args.subject, args.marks)
    };

    match previous {
        Some(old) => writeln!(inv.out, "{}: {} {old} -> {}", args.student_name, args.subject.name(), args.marks)?,
        None => writeln!(inv.out, "{}: {} = {}", args.student_name, args.subject.name(), args.marks)?,
    }
    Ok(())
}

fn export(args: &ExportArgs, inv: &mut Invocation<'_>) -> Result<()> {
    let rendered = {
        let book = grade_book(inv)?;
        if args.pretty {
            serde_json::to_string_pretty(&*book)?
        } else {
            serde_json::to_string(&*book)?
        }
    };
    fs::write(&args.path, format!("{rendered}\n"))
        .with_context(|| format!("failed to write {}", args.path.display()))?;
    writeln!(inv.out, "exported to {}", args.path.display())?;
    Ok(())
}

fn class_list(inv: &mut Invocation<'_>) -> Result<()> {
    let lines: Vec<String> = grade_book(inv)?
        .classes
        .iter()
        .map(|(class, students)| {
            let names: Vec<&str> = students.iter().map(String::as_str).collect();
            format!("{class}: {}", names.join(", "))
        })
        .collect();

    if lines.is_empty() {
        writeln!(inv.out, "no classes yet")?;
    }
    for line in lines {
        writeln!(inv.out, "{line}")?;
    }
    Ok(())
}

fn class_add(class: &str, students: Vec<String>, inv: &mut Invocation<'_>) -> Result<()> {
    let count = {
        let roster = grade_book(inv)?.classes.entry(class.to_string()).or_default();
        roster.extend(students);
        roster.len()
    };
    writeln!(inv.out, "{class}: {count} students")?;
    Ok(())
}

fn class_enter(class: &str, inv: &mut Invocation<'_>) -> Result<()> {
    let prompt = format!("school/{class}> ");
    if !inv.enter_repl(NestedRepl::new().prompt(prompt).group_path(["class"])) {
        bail!("'class enter' is only available inside the interactive shell");
    }
    writeln!(inv.out, "entering {class} (type :q to leave)")?;
    Ok(())
}

fn inspect(inv: &mut Invocation<'_>) -> Result<()> {
    let id = inv.ctx().id();
    let students = grade_book(inv)?.marks.len();
    let prompt = inv.prompt().map(str::to_string);
    writeln!(inv.out, "context: {id}")?;
    writeln!(inv.out, "students with marks: {students}")?;
    if let Some(prompt) = prompt {
        writeln!(inv.out, "prompt: {prompt:?}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Dispatcher;
    use crate::application::session::{DispatchContext, DispatchError};

    fn run(dispatcher: &ClapDispatcher, ctx: &mut DispatchContext, line: &str) -> (Result<(), DispatchError>, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let result = {
            let mut inv = Invocation::one_shot(ctx, &mut out, &mut err);
            dispatcher.dispatch(&args, &mut inv)
        };
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn cli_definition_is_consistent() {
        SchoolCli::command().debug_assert();
    }

    #[test]
    fn marks_are_kept_in_the_shared_context() {
        let dispatcher = school_dispatcher().unwrap();
        let mut ctx = DispatchContext::new();

        let (result, out) = run(&dispatcher, &mut ctx, "set-marks -s kim maths 90");
        assert!(result.is_ok());
        assert_eq!(out, "kim: maths = 90\n");

        run(&dispatcher, &mut ctx, "set-marks -s kim science 70");
        let (result, out) = run(&dispatcher, &mut ctx, "get-marks -s kim -v");
        assert!(result.is_ok());
        assert_eq!(out, "maths: 90\nscience: 70\naverage: 80.0\n");
    }

    #[test]
    fn duplicate_mark_needs_overwrite() {
        let dispatcher = school_dispatcher().unwrap();
        let mut ctx = DispatchContext::new();
        run(&dispatcher, &mut ctx, "set-marks -s kim maths 90");

        let (result, _) = run(&dispatcher, &mut ctx, "set-marks -s kim maths 95");
        assert!(matches!(result, Err(DispatchError::Failed(_))));

        let (result, out) = run(&dispatcher, &mut ctx, "set-marks -s kim maths 95 --overwrite");
        assert!(result.is_ok());
        assert_eq!(out, "kim: maths 90 -> 95\n");
    }

    #[test]
    fn invalid_choice_is_a_usage_error() {
        let dispatcher = school_dispatcher().unwrap();
        let mut ctx = DispatchContext::new();
        let (result, _) = run(&dispatcher, &mut ctx, "set-marks -s kim art 90");
        assert!(matches!(result, Err(DispatchError::Usage { .. })));
    }

    #[test]
    fn tree_carries_refinements() {
        let dispatcher = school_dispatcher().unwrap();
        let tree = dispatcher.tree();
        let Some(crate::domain::tree::Node::Command(set)) = tree.root().child("set-marks") else {
            panic!("set-marks missing");
        };
        let marks = set.params.iter().find(|p| p.name == "marks").unwrap();
        assert_eq!(marks.ty, ParamType::IntRange { min: Some(0), max: Some(100) });
        let student = set.params.iter().find(|p| p.name == "student_name").unwrap();
        assert!(student.completer.is_some());
        let subject = set.params.iter().find(|p| p.name == "subject").unwrap();
        assert_eq!(
            subject.ty,
            ParamType::choice(["maths", "science", "english", "history"])
        );
    }

    #[test]
    fn class_enter_requires_a_repl() {
        let dispatcher = school_dispatcher().unwrap();
        let mut ctx = DispatchContext::new();
        let (result, _) = run(&dispatcher, &mut ctx, "class enter 3A");
        assert!(matches!(result, Err(DispatchError::Failed(_))));
    }

    #[test]
    fn export_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        let dispatcher = school_dispatcher().unwrap();
        let mut ctx = DispatchContext::new();
        run(&dispatcher, &mut ctx, "set-marks -s lee english 88");

        let (result, _) = run(&dispatcher, &mut ctx, &format!("export {}", path.display()));
        assert!(result.is_ok());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"english\":88"), "{raw}");
    }
}
