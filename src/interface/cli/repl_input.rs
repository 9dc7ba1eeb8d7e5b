//! REPL 입력 처리기.
//! 입력 중 실시간으로 완성 메뉴, 상태바, 검증 메시지를 하단 패널에 표시한다.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use crossterm::cursor;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{self, ClearType};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::application::assist::{LineAssist, PromptFrame};
use crate::application::completion::{CompletionBatch, CompletionWorker};
use crate::application::ports::{LineReader, ReadOutcome};
use crate::application::validation::Validation;
use crate::domain::candidate::{Candidate, CandidateKind};
use crate::interface::cli::render::{candidate_color, queue_spans};

// 입력 영역 기본 높이: 상단 구분선 + 입력줄 + 하단 구분선
const PANEL_BASE_HEIGHT: usize = 3;
const MAX_MENU_ROWS: usize = 8;
// 기본 영역 + 상태바 + 검증 메시지 + 완성 메뉴
const PANEL_MAX_HEIGHT: usize = PANEL_BASE_HEIGHT + 2 + MAX_MENU_ROWS;
const MENU_DISPLAY_WIDTH: usize = 28;
const PLACEHOLDER: &str = "Tab complete · ↑↓ history · Ctrl-D exit";

/// TTY면 패널 편집기를, 아니면 줄 단위 입력을 쓰는 기본 리더.
pub struct TerminalLineReader {
    plain: Option<PlainLineReader<io::StdinLock<'static>, io::Stdout>>,
}

impl Default for TerminalLineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalLineReader {
    pub fn new() -> Self {
        Self {
            plain: (!supports_interactive_input()).then(PlainLineReader::stdio),
        }
    }
}

#[async_trait(?Send)]
impl LineReader for TerminalLineReader {
    async fn read_line(&mut self, frame: &mut PromptFrame<'_>) -> Result<ReadOutcome> {
        if let Some(plain) = self.plain.as_mut() {
            return plain.read_line(frame).await;
        }
        read_line_interactive(frame).await
    }
}

fn supports_interactive_input() -> bool {
    if !io::stdout().is_terminal() || !io::stdin().is_terminal() {
        return false;
    }

    // dumb 터미널에서는 제어 시퀀스 기반 UI를 비활성화한다.
    if let Ok(term) = env::var("TERM")
        && term.eq_ignore_ascii_case("dumb")
    {
        return false;
    }

    true
}

/// 프롬프트를 찍고 한 줄씩 읽는 대체 입력기. 파이프 입력과 테스트에서 쓴다.
pub struct PlainLineReader<R, W> {
    input: R,
    output: W,
}

impl PlainLineReader<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R, W> PlainLineReader<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[async_trait(?Send)]
impl<R: BufRead, W: Write> LineReader for PlainLineReader<R, W> {
    async fn read_line(&mut self, frame: &mut PromptFrame<'_>) -> Result<ReadOutcome> {
        loop {
            write!(self.output, "{}", frame.prompt)?;
            self.output.flush()?;

            let mut line = String::new();
            let read = self.input.read_line(&mut line)?;
            if read == 0 {
                writeln!(self.output)?;
                return Ok(ReadOutcome::Eof);
            }

            let line = trim_newline(line);
            // 제출된 줄은 마지막 토큰까지 완성된 것으로 보고 검증한다.
            let submitted = format!("{line} ");
            let validation = frame.assist.observe(&submitted, submitted.len())?;
            if frame.assist.blocks_submission(&validation) {
                if let Some(message) = validation.message() {
                    writeln!(self.output, "{message}")?;
                }
                continue;
            }
            return Ok(ReadOutcome::Line(line));
        }
    }
}

/// 키 입력 하나가 편집기에 준 효과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditAction {
    None,
    /// 커서나 메뉴 선택만 바뀌었다.
    Moved,
    Changed,
    /// 메뉴가 닫힌 상태에서 Tab.
    Complete,
    Submit,
    Interrupt,
    Eof,
}

/// 입력 버퍼, 이력 탐색, 완성 메뉴 상태. 커서는 문자 단위다.
#[derive(Debug, Default)]
struct LineEditor {
    text: String,
    cursor: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    draft: String,
    menu: Vec<Candidate>,
    selected: Option<usize>,
}

impl LineEditor {
    fn new(history: &[String]) -> Self {
        Self {
            history: history.to_vec(),
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_cursor(&self) -> usize {
        byte_index_at_char(&self.text, self.cursor)
    }

    fn set_text(&mut self, text: String) {
        self.cursor = text.chars().count();
        self.text = text;
        self.close_menu();
    }

    fn insert_str(&mut self, text: &str) {
        for ch in text.chars() {
            let ch = if ch == '\n' || ch == '\r' { ' ' } else { ch };
            insert_char_at(&mut self.text, self.cursor, ch);
            self.cursor += 1;
        }
        self.close_menu();
    }

    fn close_menu(&mut self) {
        self.menu.clear();
        self.selected = None;
    }

    fn menu_open(&self) -> bool {
        !self.menu.is_empty()
    }

    fn handle_key(&mut self, key: KeyEvent) -> EditAction {
        if key.kind != KeyEventKind::Press {
            return EditAction::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => {
                if self.text.is_empty() {
                    return EditAction::Interrupt;
                }
                self.set_text(String::new());
                self.history_pos = None;
                EditAction::Changed
            }
            KeyCode::Char('d') if ctrl => {
                if self.text.is_empty() {
                    return EditAction::Eof;
                }
                self.delete_at(self.cursor)
            }
            KeyCode::Char('a') if ctrl => self.move_to(0),
            KeyCode::Char('e') if ctrl => self.move_to(self.len()),
            KeyCode::Char('u') if ctrl => {
                let rest: String = self.text.chars().skip(self.cursor).collect();
                self.text = rest;
                self.cursor = 0;
                self.close_menu();
                EditAction::Changed
            }
            KeyCode::Char(ch) if !ctrl && !alt => {
                insert_char_at(&mut self.text, self.cursor, ch);
                self.cursor += 1;
                self.close_menu();
                EditAction::Changed
            }
            KeyCode::Enter => {
                if self.apply_selected() {
                    EditAction::Changed
                } else {
                    EditAction::Submit
                }
            }
            KeyCode::Tab => {
                if !self.menu_open() {
                    return EditAction::Complete;
                }
                if self.menu.len() == 1 {
                    return if self.apply_selected_or_first() {
                        EditAction::Changed
                    } else {
                        EditAction::None
                    };
                }
                self.select_next();
                EditAction::Moved
            }
            KeyCode::BackTab => {
                self.select_prev();
                EditAction::Moved
            }
            KeyCode::Esc => {
                self.close_menu();
                EditAction::Moved
            }
            KeyCode::Up => {
                if self.menu_open() {
                    self.select_prev();
                    EditAction::Moved
                } else if self.history_prev() {
                    EditAction::Changed
                } else {
                    EditAction::None
                }
            }
            KeyCode::Down => {
                if self.menu_open() {
                    self.select_next();
                    EditAction::Moved
                } else if self.history_next() {
                    EditAction::Changed
                } else {
                    EditAction::None
                }
            }
            KeyCode::Backspace => {
                if self.cursor == 0 {
                    return EditAction::None;
                }
                self.cursor -= 1;
                self.delete_at(self.cursor)
            }
            KeyCode::Delete => self.delete_at(self.cursor),
            KeyCode::Left => self.move_to(self.cursor.saturating_sub(1)),
            KeyCode::Right => self.move_to((self.cursor + 1).min(self.len())),
            KeyCode::Home => self.move_to(0),
            KeyCode::End => self.move_to(self.len()),
            _ => EditAction::None,
        }
    }

    fn delete_at(&mut self, char_idx: usize) -> EditAction {
        if char_idx >= self.len() {
            return EditAction::None;
        }
        remove_char_at(&mut self.text, char_idx);
        self.close_menu();
        EditAction::Changed
    }

    fn move_to(&mut self, cursor: usize) -> EditAction {
        if cursor == self.cursor {
            return EditAction::None;
        }
        self.cursor = cursor;
        self.close_menu();
        EditAction::Moved
    }

    fn select_next(&mut self) {
        if self.menu.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(idx) => (idx + 1) % self.menu.len(),
            None => 0,
        });
    }

    fn select_prev(&mut self) {
        if self.menu.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(0) | None => self.menu.len() - 1,
            Some(idx) => idx - 1,
        });
    }

    fn apply_selected(&mut self) -> bool {
        let Some(candidate) = self.selected.and_then(|idx| self.menu.get(idx)).cloned() else {
            return false;
        };
        self.apply(&candidate)
    }

    fn apply_selected_or_first(&mut self) -> bool {
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        self.apply_selected()
    }

    /// 오류 후보는 삽입하지 않는다.
    fn apply(&mut self, candidate: &Candidate) -> bool {
        if candidate.kind == CandidateKind::Error {
            return false;
        }
        let (line, byte_cursor) = candidate.apply(&self.text, self.byte_cursor());
        self.cursor = line[..byte_cursor].chars().count();
        self.text = line;
        self.close_menu();
        true
    }

    /// 완성 결과를 받는다. Tab으로 요청했고 후보가 하나면 바로 적용한다.
    fn offer(&mut self, candidates: Vec<Candidate>, from_tab: bool) -> bool {
        if from_tab
            && let [only] = candidates.as_slice()
            && only.kind != CandidateKind::Error
        {
            let only = only.clone();
            return self.apply(&only);
        }
        self.menu = candidates;
        self.selected = None;
        false
    }

    fn history_prev(&mut self) -> bool {
        if self.history.is_empty() {
            return false;
        }
        let next = match self.history_pos {
            Some(0) => return false,
            Some(pos) => pos - 1,
            None => {
                self.draft = self.text.clone();
                self.history.len() - 1
            }
        };
        self.history_pos = Some(next);
        let entry = self.history[next].clone();
        self.set_text(entry);
        true
    }

    fn history_next(&mut self) -> bool {
        let Some(pos) = self.history_pos else {
            return false;
        };
        if pos + 1 < self.history.len() {
            self.history_pos = Some(pos + 1);
            let entry = self.history[pos + 1].clone();
            self.set_text(entry);
        } else {
            self.history_pos = None;
            let draft = std::mem::take(&mut self.draft);
            self.set_text(draft);
        }
        true
    }
}

async fn read_line_interactive(frame: &mut PromptFrame<'_>) -> Result<ReadOutcome> {
    let mut stdout = io::stdout();
    let _guard = InputGuard::enter(&mut stdout)?;
    let mut panel = Panel::reserve(&mut stdout)?;

    let mut editor = LineEditor::new(frame.history);
    let (mut flow, mut batches) = match frame.assist.spawn_worker() {
        Some((worker, rx)) => (CompletionFlow::new(Some(worker)), Some(rx)),
        None => (CompletionFlow::new(None), None),
    };

    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(frame.assist.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut validation = frame.assist.observe("", 0)?;

    loop {
        panel.draw(&mut stdout, frame, &editor, &validation)?;

        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    panel.finish(&mut stdout, frame.prompt, &editor.text)?;
                    return Ok(ReadOutcome::Eof);
                };
                let action = match event.context("failed to read terminal event")? {
                    Event::Key(key) => editor.handle_key(key),
                    Event::Paste(text) => {
                        editor.insert_str(&text);
                        EditAction::Changed
                    }
                    Event::Resize(_, _) => {
                        panel.resize();
                        EditAction::None
                    }
                    _ => EditAction::None,
                };

                match action {
                    EditAction::None => {}
                    EditAction::Moved | EditAction::Changed | EditAction::Complete => {
                        flow.after_edit(action, &mut frame.assist, &mut editor);
                        validation = frame.assist.observe(&editor.text, editor.byte_cursor())?;
                    }
                    EditAction::Submit => {
                        if frame.assist.blocks_submission(&validation) {
                            continue;
                        }
                        flow.after_edit(action, &mut frame.assist, &mut editor);
                        panel.finish(&mut stdout, frame.prompt, &editor.text)?;
                        return Ok(ReadOutcome::Line(editor.text));
                    }
                    EditAction::Interrupt => {
                        panel.finish(&mut stdout, frame.prompt, "")?;
                        return Ok(ReadOutcome::Interrupted);
                    }
                    EditAction::Eof => {
                        panel.finish(&mut stdout, frame.prompt, "")?;
                        return Ok(ReadOutcome::Eof);
                    }
                }
            }
            _ = ticker.tick() => {
                frame.assist.tick(panel.width);
            }
            Some(batch) = next_batch(batches.as_mut()) => {
                if flow.deliver(batch, &mut frame.assist, &mut editor) {
                    validation = frame.assist.observe(&editor.text, editor.byte_cursor())?;
                }
            }
        }
    }
}

/// 편집 동작과 완성 작업 스레드 사이의 요청 상태.
/// 새 요청을 보내지 않는 편집은 진행 중인 요청을 버리므로, 늦게 온 결과가 바뀐 줄에 적용되지 않는다.
struct CompletionFlow {
    worker: Option<CompletionWorker>,
    /// Tab으로 보낸 요청의 세대. 이 세대의 결과만 후보 하나를 바로 삽입한다.
    pending_tab: Option<u64>,
}

impl CompletionFlow {
    fn new(worker: Option<CompletionWorker>) -> Self {
        Self {
            worker,
            pending_tab: None,
        }
    }

    fn after_edit(&mut self, action: EditAction, assist: &mut LineAssist, editor: &mut LineEditor) {
        match action {
            EditAction::Complete => self.request(assist, editor, true),
            EditAction::Changed if assist.complete_while_typing => self.request(assist, editor, false),
            EditAction::None => {}
            _ => self.discard(),
        }
    }

    /// 작업 스레드가 있으면 요청만 보낸다. 없으면 바로 계산해 편집기에 넘긴다.
    fn request(&mut self, assist: &mut LineAssist, editor: &mut LineEditor, from_tab: bool) {
        match self.worker.as_mut() {
            Some(worker) => {
                let generation = worker.request(&editor.text, editor.byte_cursor());
                self.pending_tab = from_tab.then_some(generation);
            }
            None => {
                self.pending_tab = None;
                let candidates = assist.complete(&editor.text, editor.byte_cursor());
                editor.offer(candidates, from_tab);
            }
        }
    }

    fn discard(&mut self) {
        self.pending_tab = None;
        if let Some(worker) = self.worker.as_mut() {
            worker.cancel();
        }
    }

    /// 최신 요청의 결과만 반영한다. 줄이 바뀌었으면 true.
    fn deliver(&mut self, batch: CompletionBatch, assist: &mut LineAssist, editor: &mut LineEditor) -> bool {
        if !self.worker.as_ref().is_some_and(|w| w.is_current(&batch)) {
            return false;
        }
        assist.absorb(&batch.candidates);
        let from_tab = self.pending_tab.take() == Some(batch.generation);
        editor.offer(batch.candidates, from_tab)
    }
}

async fn next_batch(rx: Option<&mut mpsc::UnboundedReceiver<CompletionBatch>>) -> Option<CompletionBatch> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// 화면 하단에 예약한 입력 패널 영역.
struct Panel {
    top: u16,
    rows: u16,
    width: usize,
}

impl Panel {
    /// 패널 높이만큼 줄을 밀어 올려 기존 출력이 가려지지 않게 한다.
    fn reserve(stdout: &mut io::Stdout) -> Result<Self> {
        let (w, h) = terminal::size().unwrap_or((120, 40));
        let rows = PANEL_MAX_HEIGHT.min(h as usize) as u16;
        for _ in 0..rows {
            write!(stdout, "\r\n")?;
        }
        execute!(stdout, cursor::MoveToPreviousLine(rows))?;
        let top = cursor::position()
            .map(|(_, row)| row)
            .unwrap_or_else(|_| h.saturating_sub(rows));
        Ok(Self {
            top,
            rows,
            width: (w as usize).max(20),
        })
    }

    fn resize(&mut self) {
        let (w, h) = terminal::size().unwrap_or((120, 40));
        self.width = (w as usize).max(20);
        self.rows = self.rows.min(h);
        self.top = self.top.min(h.saturating_sub(self.rows));
    }

    fn clear(&self, stdout: &mut io::Stdout) -> Result<()> {
        for row in self.top..self.top.saturating_add(self.rows) {
            clear_line_at(stdout, row)?;
        }
        Ok(())
    }

    fn draw(
        &self,
        stdout: &mut io::Stdout,
        frame: &PromptFrame<'_>,
        editor: &LineEditor,
        validation: &Validation,
    ) -> Result<()> {
        let width = self.width;
        let limit = self.top.saturating_add(self.rows);
        self.clear(stdout)?;

        // 입력 영역(구분선 + 입력줄 + 구분선)에만 배경색을 적용한다.
        let divider = "─".repeat(width);
        let input_row = self.top + 1;
        draw_panel_line_at(stdout, self.top, &divider, width)?;
        if editor.text.is_empty() {
            let placeholder = render_prompt_line(frame.prompt, PLACEHOLDER, width);
            draw_panel_line_at_with_fg(stdout, input_row, &placeholder, width, Color::Grey)?;
        } else {
            let line = render_prompt_line(frame.prompt, &editor.text, width);
            draw_panel_line_at(stdout, input_row, &line, width)?;
        }
        draw_panel_line_at(stdout, self.top + 2, &divider, width)?;

        // 하단 구분선 아래: 상태바, 검증 메시지, 완성 메뉴 순.
        let mut next_row = self.top + PANEL_BASE_HEIGHT as u16;

        let status = frame.assist.status_line(width);
        if !status.is_empty() && next_row < limit {
            execute!(stdout, cursor::MoveTo(0, next_row))?;
            queue_spans(stdout, &status)?;
            next_row += 1;
        }

        if let Some(message) = validation.message()
            && next_row < limit
        {
            draw_line_at_with_fg(stdout, next_row, &clip_line_display(message, width), width, Color::Red)?;
            next_row += 1;
        }

        let start = editor
            .selected
            .map(|idx| idx.saturating_sub(MAX_MENU_ROWS - 1))
            .unwrap_or(0);
        for (idx, item) in editor.menu.iter().enumerate().skip(start).take(MAX_MENU_ROWS) {
            if next_row >= limit {
                break;
            }
            let marker = if Some(idx) == editor.selected { ">" } else { " " };
            let display = pad_line_display(&clip_line_display(&item.display, MENU_DISPLAY_WIDTH), MENU_DISPLAY_WIDTH);
            let line = match &item.help {
                Some(help) => format!("{marker} {display} {help}"),
                None => format!("{marker} {display}"),
            };
            draw_line_at_with_fg(stdout, next_row, &clip_line_display(&line, width), width, candidate_color(item.kind))?;
            next_row += 1;
        }

        let col = prompt_cursor_col(frame.prompt, &editor.text, editor.cursor, width) as u16;
        execute!(stdout, cursor::MoveTo(col, input_row), cursor::Show)?;
        stdout.flush()?;
        Ok(())
    }

    /// 패널을 지우고 제출된 줄을 일반 출력처럼 남긴다.
    fn finish(&self, stdout: &mut io::Stdout, prompt: &str, text: &str) -> Result<()> {
        self.clear(stdout)?;
        execute!(stdout, cursor::MoveTo(0, self.top), ResetColor, cursor::Show)?;
        write!(stdout, "{prompt}{text}\r\n")?;
        stdout.flush()?;
        Ok(())
    }
}

fn render_prompt_line(prompt: &str, input: &str, width: usize) -> String {
    let prefix_width = display_width(prompt);
    let available = width.saturating_sub(prefix_width);
    let shown = tail_with_ellipsis_display(input, available);
    clip_line_display(&format!("{prompt}{shown}"), width)
}

fn prompt_cursor_col(prompt: &str, input: &str, cursor_chars: usize, width: usize) -> usize {
    let prefix_width = display_width(prompt);
    let input_width = display_width(input);
    let before_cursor: String = input.chars().take(cursor_chars).collect();
    let before_cursor_width = display_width(&before_cursor);
    let available = width.saturating_sub(prefix_width);

    if input_width <= available {
        return (prefix_width + before_cursor_width).min(width.saturating_sub(1));
    }

    // 오버플로우 상태에서는 tail 표시 정책상 커서를 입력 끝쪽으로 정렬한다.
    (prefix_width + display_width(&tail_with_ellipsis_display(input, available)))
        .min(width.saturating_sub(1))
}

fn tail_with_ellipsis_display(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(text) <= max_width {
        return text.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }

    let target = max_width - 3;
    let mut tail_rev = String::new();
    let mut used = 0usize;
    for ch in text.chars().rev() {
        let cw = char_display_width(ch);
        if used + cw > target {
            break;
        }
        tail_rev.push(ch);
        used += cw;
    }

    let tail: String = tail_rev.chars().rev().collect();
    format!("...{tail}")
}

fn clip_line_display(line: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(line) <= max_width {
        return line.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }

    let mut out = String::new();
    let mut used = 0usize;
    let cap = max_width - 3;
    for ch in line.chars() {
        let cw = char_display_width(ch);
        if used + cw > cap {
            break;
        }
        out.push(ch);
        used += cw;
    }

    out.push_str("...");
    out
}

fn pad_line_display(line: &str, width: usize) -> String {
    let mut out = line.to_string();
    let used = display_width(line);
    if used < width {
        out.push_str(&" ".repeat(width - used));
    }
    out
}

fn trim_newline(mut s: String) -> String {
    while matches!(s.chars().last(), Some('\n' | '\r')) {
        s.pop();
    }
    s
}

// 라인을 기본 배경으로 클리어만 한다.
fn clear_line_at(stdout: &mut io::Stdout, row: u16) -> Result<()> {
    execute!(stdout, cursor::MoveTo(0, row), terminal::Clear(ClearType::CurrentLine))?;
    Ok(())
}

// 배경색이 있는 패널 라인 (입력 영역용).
fn draw_panel_line_at(stdout: &mut io::Stdout, row: u16, text: &str, width: usize) -> Result<()> {
    draw_panel_line_at_with_fg(stdout, row, text, width, Color::White)
}

fn draw_panel_line_at_with_fg(
    stdout: &mut io::Stdout,
    row: u16,
    text: &str,
    width: usize,
    fg: Color,
) -> Result<()> {
    execute!(
        stdout,
        cursor::MoveTo(0, row),
        SetBackgroundColor(Color::DarkGrey),
        SetForegroundColor(fg),
        terminal::Clear(ClearType::CurrentLine)
    )?;
    write!(stdout, "{}", pad_line_display(&clip_line_display(text, width), width))?;
    execute!(stdout, ResetColor)?;
    Ok(())
}

// 배경색 없는 일반 라인 (메시지/메뉴 영역용).
fn draw_line_at_with_fg(
    stdout: &mut io::Stdout,
    row: u16,
    text: &str,
    width: usize,
    fg: Color,
) -> Result<()> {
    execute!(
        stdout,
        cursor::MoveTo(0, row),
        terminal::Clear(ClearType::CurrentLine),
        SetForegroundColor(fg)
    )?;
    write!(stdout, "{}", pad_line_display(&clip_line_display(text, width), width))?;
    execute!(stdout, ResetColor)?;
    Ok(())
}

// unicode-width 크레이트를 사용하여 정확한 터미널 표시 폭을 계산한다.
fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

struct InputGuard;

impl InputGuard {
    fn enter(stdout: &mut io::Stdout) -> Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(stdout, cursor::Show)?;
        Ok(Self)
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, cursor::Show, ResetColor);
        let _ = terminal::disable_raw_mode();
        let _ = stdout.flush();
    }
}

fn insert_char_at(input: &mut String, char_idx: usize, ch: char) {
    let byte_idx = byte_index_at_char(input, char_idx);
    input.insert(byte_idx, ch);
}

fn remove_char_at(input: &mut String, char_idx: usize) {
    let start = byte_index_at_char(input, char_idx);
    let end = byte_index_at_char(input, char_idx + 1);
    if start < end && end <= input.len() {
        input.replace_range(start..end, "");
    }
}

fn byte_index_at_char(input: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    input
        .char_indices()
        .nth(char_idx)
        .map(|(idx, _)| idx)
        .unwrap_or(input.len())
}
