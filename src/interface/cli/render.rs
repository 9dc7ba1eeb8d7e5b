//! 스타일 토큰/후보 종류를 터미널 색으로 옮기는 렌더링 규칙.

use std::io::Write;

use anyhow::Result;
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

use crate::domain::candidate::CandidateKind;
use crate::domain::styled::{Role, StyledSpan, UsageState};

pub fn role_color(role: Role) -> Color {
    match role {
        Role::Prefix => Color::Grey,
        Role::GroupName => Color::Cyan,
        Role::CommandName => Color::Green,
        Role::Metavar => Color::Yellow,
        Role::Param(state) | Role::ParamType(state) => usage_color(state),
        Role::Punctuation => Color::DarkGrey,
        Role::Error => Color::Red,
        Role::Plain => Color::White,
    }
}

fn usage_color(state: UsageState) -> Color {
    match state {
        UsageState::Unused => Color::Grey,
        UsageState::Current => Color::Magenta,
        UsageState::Used => Color::DarkGrey,
    }
}

pub fn candidate_color(kind: CandidateKind) -> Color {
    match kind {
        CandidateKind::Group => Color::Cyan,
        CandidateKind::Command => Color::Green,
        CandidateKind::Option | CandidateKind::BoolFlag(_) => Color::Yellow,
        CandidateKind::Value => Color::White,
        CandidateKind::File => Color::Blue,
        CandidateKind::Directory => Color::DarkCyan,
        CandidateKind::Internal => Color::Magenta,
        CandidateKind::Error => Color::Red,
    }
}

/// 스팬을 색과 함께 출력한다. 현재 파라미터는 굵게 표시한다.
pub fn queue_spans(out: &mut impl Write, spans: &[StyledSpan]) -> Result<()> {
    for span in spans {
        let bold = matches!(
            span.role,
            Role::Param(UsageState::Current) | Role::ParamType(UsageState::Current)
        );
        queue!(out, SetForegroundColor(role_color(span.role)))?;
        if bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        queue!(out, Print(&span.text))?;
        if bold {
            queue!(out, SetAttribute(Attribute::NormalIntensity))?;
        }
    }
    queue!(out, ResetColor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_keep_their_text() {
        let spans = vec![
            StyledSpan::new(Role::Prefix, "Command greet: "),
            StyledSpan::new(Role::Param(UsageState::Current), "name"),
        ];
        let mut out = Vec::new();
        queue_spans(&mut out, &spans).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("Command greet: "));
        assert!(rendered.contains("name"));
        assert!(rendered.contains("\x1b["));
    }

    #[test]
    fn usage_states_are_distinguishable() {
        let colors = [
            role_color(Role::Param(UsageState::Unused)),
            role_color(Role::Param(UsageState::Current)),
            role_color(Role::Param(UsageState::Used)),
        ];
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }
}
