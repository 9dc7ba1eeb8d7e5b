//! 폭을 넘는 상태 텍스트를 가로로 흘려 보여주는 마퀴 효과.
//!
//! 접두어는 고정되고, 본문은 틱마다 한 글자씩 왼쪽으로 회전한다.
//! 본문 끝 뒤에는 공백 간격이 붙어 처음과 이어진다.

use unicode_width::UnicodeWidthChar;

use crate::domain::styled::{Role, StyledSpan};

const GAP: &str = "   ";
/// 시작 위치에서 회전을 시작하기 전에 기다리는 틱 수.
const PAUSE_TICKS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marquee {
    prefix: Vec<StyledSpan>,
    text: Vec<StyledSpan>,
    offset: usize,
    waited: usize,
}

impl Marquee {
    pub fn new(prefix: Vec<StyledSpan>, text: Vec<StyledSpan>) -> Self {
        Self {
            prefix,
            text,
            offset: 0,
            waited: 0,
        }
    }

    pub fn prefix(&self) -> &[StyledSpan] {
        &self.prefix
    }

    pub fn text(&self) -> &[StyledSpan] {
        &self.text
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 한 틱 진행한다. 본문이 남는 폭에 들어가면 처음 위치로 되돌린다.
    pub fn tick(&mut self, width: usize) {
        let available = width.saturating_sub(spans_width(&self.prefix));
        let text_width = spans_width(&self.text);
        if text_width <= available {
            self.offset = 0;
            self.waited = 0;
            return;
        }

        if self.offset == 0 && self.waited < PAUSE_TICKS {
            self.waited += 1;
            return;
        }

        let cycle = self.text.iter().map(|s| s.text.chars().count()).sum::<usize>() + GAP.len();
        self.offset = (self.offset + 1) % cycle;
        if self.offset == 0 {
            self.waited = 0;
        }
    }

    /// 현재 위치에서 `width` 칸에 맞춘 프레임(접두어 포함).
    pub fn frame(&self, width: usize) -> Vec<StyledSpan> {
        let available = width.saturating_sub(spans_width(&self.prefix));
        let mut out = self.prefix.clone();

        if spans_width(&self.text) <= available {
            out.extend(self.text.iter().cloned());
            return out;
        }

        let cells: Vec<(Role, char)> = self
            .text
            .iter()
            .flat_map(|span| span.text.chars().map(move |c| (span.role, c)))
            .chain(GAP.chars().map(|c| (Role::Plain, c)))
            .collect();
        if cells.is_empty() {
            return out;
        }

        let mut used = 0;
        let mut window: Vec<StyledSpan> = Vec::new();
        for (role, ch) in cells.iter().cycle().skip(self.offset % cells.len()).take(cells.len()) {
            let w = ch.width().unwrap_or(0);
            if used + w > available {
                break;
            }
            used += w;
            match window.last_mut() {
                Some(last) if last.role == *role => last.text.push(*ch),
                _ => window.push(StyledSpan::new(*role, ch.to_string())),
            }
        }
        out.extend(window);
        out
    }
}

/// 스팬들의 표시 폭.
pub fn spans_width(spans: &[StyledSpan]) -> usize {
    spans
        .iter()
        .map(|s| unicode_width::UnicodeWidthStr::width(s.text.as_str()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::styled::plain_text;
    use pretty_assertions::assert_eq;

    fn marquee() -> Marquee {
        Marquee::new(
            vec![StyledSpan::new(Role::Prefix, "Cmd: ")],
            vec![
                StyledSpan::new(Role::Metavar, "abcdef"),
                StyledSpan::new(Role::Plain, "ghij"),
            ],
        )
    }

    #[test]
    fn fitting_text_is_static() {
        let mut m = marquee();
        for _ in 0..20 {
            m.tick(40);
        }
        assert_eq!(m.offset(), 0);
        assert_eq!(plain_text(&m.frame(40)), "Cmd: abcdefghij");
    }

    #[test]
    fn overflow_pauses_then_rotates() {
        let mut m = marquee();
        assert_eq!(plain_text(&m.frame(10)), "Cmd: abcde");

        for _ in 0..PAUSE_TICKS {
            m.tick(10);
        }
        assert_eq!(m.offset(), 0);

        m.tick(10);
        assert_eq!(plain_text(&m.frame(10)), "Cmd: bcdef");
        m.tick(10);
        assert_eq!(plain_text(&m.frame(10)), "Cmd: cdefg");
    }

    #[test]
    fn rotation_wraps_through_gap() {
        let mut m = marquee();
        for _ in 0..PAUSE_TICKS {
            m.tick(10);
        }
        for _ in 0..8 {
            m.tick(10);
        }
        assert_eq!(plain_text(&m.frame(10)), "Cmd: ij   ");
        for _ in 0..5 {
            m.tick(10);
        }
        // 한 바퀴 돌면 다시 처음에서 멈춘다.
        assert_eq!(m.offset(), 0);
        m.tick(10);
        assert_eq!(m.offset(), 0);
    }

    #[test]
    fn frame_merges_roles_and_keeps_prefix() {
        let m = marquee();
        let frame = m.frame(12);
        assert_eq!(frame[0], StyledSpan::new(Role::Prefix, "Cmd: "));
        assert_eq!(frame[1], StyledSpan::new(Role::Metavar, "abcdef"));
        assert_eq!(frame[2], StyledSpan::new(Role::Plain, "g"));
    }

    #[test]
    fn wide_characters_count_two_columns() {
        let m = Marquee::new(Vec::new(), vec![StyledSpan::new(Role::Plain, "가나다라")]);
        assert_eq!(plain_text(&m.frame(5)), "가나");
    }
}
