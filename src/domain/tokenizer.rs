//! 쉘 규칙을 따르는 입력 줄 분리기.
//! 따옴표/이스케이프/주석을 처리하고 각 토큰의 원문 구간을 보존한다.

use std::env;

/// 원문 내 바이트 구간 `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// 분리된 토큰 하나.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    /// 따옴표와 이스케이프를 해석한 값.
    pub text: String,
    /// 입력 원문 그대로의 조각.
    pub raw: String,
    pub span: Span,
    /// 닫히지 않은 따옴표로 끝났는지 여부.
    pub unterminated: bool,
}

/// 한 줄을 분리한 결과.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tokenized {
    /// 입력이 끝난(뒤에 공백이 온) 토큰들.
    pub complete: Vec<RawToken>,
    /// 줄이 공백으로 끝나지 않을 때의 마지막 토큰.
    pub incomplete: Option<RawToken>,
    /// `#` 주석 구간.
    pub comment: Option<Span>,
}

impl Tokenized {
    pub fn args(&self) -> Vec<String> {
        self.complete.iter().map(|t| t.text.clone()).collect()
    }

    /// 입력 중 토큰을 포함한 모든 토큰 값.
    pub fn all_args(&self) -> Vec<String> {
        self.complete
            .iter()
            .chain(self.incomplete.iter())
            .map(|t| t.text.clone())
            .collect()
    }
}

/// 줄을 토큰으로 분리한다. 실패하지 않는다.
pub fn tokenize(line: &str) -> Tokenized {
    let mut out = Tokenized::default();
    let mut current: Option<Builder> = None;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let in_quote = current.as_ref().and_then(|b| b.quote);

        match in_quote {
            Some('\'') => {
                let builder = current.get_or_insert_with(|| Builder::new(idx));
                if ch == '\'' {
                    builder.quote = None;
                } else {
                    builder.text.push(ch);
                }
            }
            Some(_) => {
                let builder = current.get_or_insert_with(|| Builder::new(idx));
                match ch {
                    '"' => builder.quote = None,
                    '\\' => match chars.peek() {
                        Some(&(_, next)) if matches!(next, '"' | '\\' | '$' | '`') => {
                            builder.text.push(next);
                            chars.next();
                        }
                        _ => builder.text.push('\\'),
                    },
                    _ => builder.text.push(ch),
                }
            }
            None => {
                if ch.is_whitespace() {
                    if let Some(builder) = current.take() {
                        out.complete.push(builder.finish(line, idx));
                    }
                    continue;
                }
                if ch == '#' && current.is_none() {
                    out.comment = Some(Span::new(idx, line.len()));
                    break;
                }

                let builder = current.get_or_insert_with(|| Builder::new(idx));
                match ch {
                    '\'' | '"' => builder.quote = Some(ch),
                    '\\' => match chars.next() {
                        Some((_, next)) => builder.text.push(next),
                        None => builder.text.push('\\'),
                    },
                    _ => builder.text.push(ch),
                }
            }
        }
    }

    if let Some(builder) = current.take() {
        let end = out.comment.map(|c| c.start).unwrap_or(line.len());
        let token = builder.finish(line, end);
        if out.comment.is_some() {
            out.complete.push(token);
        } else {
            out.incomplete = Some(token);
        }
    }

    out
}

/// 제출된 줄을 인자 목록으로 바꾼다. 주석은 버린다.
pub fn split_args(line: &str) -> Vec<String> {
    tokenize(line).all_args()
}

/// 주석을 제거한 줄. 앞뒤 공백도 정리한다.
pub fn strip_comment(line: &str) -> &str {
    let tokenized = tokenize(line);
    let end = tokenized.comment.map(|c| c.start).unwrap_or(line.len());
    line[..end].trim()
}

/// 커서(바이트) 앞부분. 커서가 문자 중간을 가리키면 그 문자 앞에서 자른다.
pub fn before_cursor(line: &str, cursor: usize) -> &str {
    let mut cursor = cursor.min(line.len());
    while !line.is_char_boundary(cursor) {
        cursor -= 1;
    }
    &line[..cursor]
}

/// 인자 목록을 다시 한 줄로 합친다. 공백/따옴표가 있는 인자는 인용한다.
pub fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| quote_arg(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let needs_quotes = arg
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '#'));
    if !needs_quotes {
        return arg.to_string();
    }
    if !arg.contains('\'') {
        return format!("'{arg}'");
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$");
    format!("\"{escaped}\"")
}

/// 입력 중인 값의 `~`와 `$VAR`/`${VAR}`를 펼친다. 정의되지 않은 변수는 그대로 둔다.
pub fn expand_value(value: &str) -> String {
    let home_expanded = match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => format!("{}{rest}", home.display()),
            None => value.to_string(),
        },
        _ => value.to_string(),
    };
    expand_env_vars(&home_expanded).trim().to_string()
}

/// 펼쳐진 접두어로 시작하는 후보를 사용자가 입력한 원래 접두어로 되돌린다.
pub fn restore_prefix(typed: &str, expanded: &str, candidate: &str) -> String {
    if typed != expanded
        && let Some(rest) = candidate.strip_prefix(expanded)
    {
        return format!("{typed}{rest}");
    }
    candidate.to_string()
}

fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let len = after
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..len], len)
        };

        match (name.is_empty(), env::var(name)) {
            (false, Ok(val)) => out.push_str(&val),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

struct Builder {
    start: usize,
    text: String,
    quote: Option<char>,
}

impl Builder {
    fn new(start: usize) -> Self {
        Self {
            start,
            text: String::new(),
            quote: None,
        }
    }

    fn finish(self, line: &str, end: usize) -> RawToken {
        RawToken {
            text: self.text,
            raw: line[self.start..end].to_string(),
            span: Span::new(self.start, end),
            unterminated: self.quote.is_some(),
        }
    }
}
