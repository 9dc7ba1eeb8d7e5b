//! 성적부 대화형 쉘(REPL) 진입 화면과 실행.

use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use tracing::info;

use crate::application::config::ReplConfig;
use crate::application::validation::ValidationMode;
use crate::interface::cli::composition::AppComposition;
use crate::interface::cli::repl_input::TerminalLineReader;

const BOX_WIDTH: usize = 58;

/// 배너를 출력하고 터미널 줄 편집기로 REPL을 돌린다.
pub async fn run_repl(composition: &AppComposition) -> Result<()> {
    print_welcome(composition);
    io::stdout().flush()?;

    let mut repl = composition.repl()?;
    let mut reader = TerminalLineReader::new();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let result = repl.run(&mut reader, &mut stdout, &mut stderr).await;
    info!(ok = result.is_ok(), "REPL finished");
    result
}

fn print_welcome(composition: &AppComposition) {
    let interactive = io::stdout().is_terminal();
    if interactive {
        // 대화형 터미널에서는 시작 화면을 지우고 배너를 출력한다.
        print!("\x1b[2J\x1b[H");
    }

    let border = format!("+{}+", "-".repeat(BOX_WIDTH + 2));
    println!("{border}");
    println!("| {} |", boxed("school grade book shell", "1;36", interactive));
    println!("| {} |", boxed("clap commands, interactively", "2;37", interactive));
    println!("{border}");
    println!("| {} |", boxed("Status", "0", false));
    for line in build_startup_lines(composition) {
        println!("| {} |", boxed(&line, "0", false));
    }
    println!("{border}");
    println!("| {} |", boxed("Quick start", "0", false));
    for (index, (text, ansi)) in quick_start_lines(composition.config())
        .into_iter()
        .enumerate()
    {
        let entry = fit_box_line(&format!(" {index}) {text}"), BOX_WIDTH);
        println!("| {} |", boxed(&entry, ansi, interactive));
    }
    println!("{border}");
    println!();
}

/// 상자 폭에 맞춰 자르고 채운 뒤 색을 입힌다. 색 코드가 폭 계산에 섞이지 않는다.
fn boxed(text: &str, ansi: &str, interactive: bool) -> String {
    let fitted = fit_box_line(text, BOX_WIDTH);
    let padded = format!("{fitted:<BOX_WIDTH$}");
    paint(&padded, ansi, interactive)
}

fn paint(text: &str, ansi: &str, interactive: bool) -> String {
    if interactive {
        format!("\x1b[{ansi}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

fn build_startup_lines(composition: &AppComposition) -> Vec<String> {
    let config = composition.config();
    let mut lines = Vec::new();

    let loaded = composition.loaded_paths();
    if loaded.is_empty() {
        lines.push("Config: defaults (no config file found)".to_string());
    } else {
        lines.push(format!("Config: ok (loaded files: {})", loaded.len()));
    }

    let history = config
        .history_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "memory only".to_string());
    lines.push(format!("History: {history}"));

    let mode = match config.validation_mode {
        ValidationMode::Advisory => "advisory",
        ValidationMode::Blocking => "blocking",
    };
    lines.push(format!("Validation: {mode}"));

    if let Some(path) = &config.error_log_file {
        lines.push(format!("Error log: {}", path.display()));
    }
    lines
}

fn quick_start_lines(config: &ReplConfig) -> Vec<(String, &'static str)> {
    let mut lines = vec![("<tab> to complete, --help for usage".to_string(), "1;33")];
    if let Some(prefix) = &config.internal_command_prefix {
        lines.push((format!("{prefix}help  internal commands"), "1;32"));
        lines.push((format!("{prefix}exit  leave this level"), "1;31"));
    }
    if let Some(prefix) = &config.system_command_prefix {
        lines.push((format!("{prefix}<cmd>  run a system command"), "1;35"));
    }
    lines
}

fn fit_box_line(text: &str, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return text.to_string();
    }

    if width <= 3 {
        return ".".repeat(width);
    }

    let keep = width - 3;
    let head: String = chars.into_iter().take(keep).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_box_line_truncates_with_ellipsis() {
        assert_eq!(fit_box_line("abcdef", 10), "abcdef");
        assert_eq!(fit_box_line("abcdefghijkl", 8), "abcde...");
        assert_eq!(fit_box_line("abcdef", 2), "..");
    }

    #[test]
    fn boxed_pads_before_painting() {
        let plain = boxed("hi", "1;36", false);
        assert_eq!(plain.len(), BOX_WIDTH);
        let painted = boxed("hi", "1;36", true);
        assert!(painted.starts_with("\x1b[1;36mhi "));
        assert!(painted.ends_with("\x1b[0m"));
    }

    #[test]
    fn quick_start_follows_prefixes() {
        let config = ReplConfig::default()
            .internal_command_prefix(None)
            .system_command_prefix(Some("$"));
        let lines: Vec<String> = quick_start_lines(&config)
            .into_iter()
            .map(|(text, _)| text)
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("$<cmd>"));
    }

    #[test]
    fn startup_lines_mention_validation_mode() {
        let config = ReplConfig::default().validation_mode(ValidationMode::Blocking);
        let lines = build_startup_lines(&AppComposition::from_config(config));
        assert!(lines.iter().any(|l| l == "Validation: blocking"));
        assert!(lines[0].starts_with("Config: defaults"));
    }
}
