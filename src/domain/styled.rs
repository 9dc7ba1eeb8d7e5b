//! 상태바에 그려지는 스타일 토큰.

/// 파라미터 사용 상태. 세 상태는 서로 배타적이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageState {
    Unused,
    Current,
    Used,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Prefix,
    GroupName,
    CommandName,
    Metavar,
    Param(UsageState),
    ParamType(UsageState),
    Punctuation,
    Error,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub role: Role,
    pub text: String,
}

impl StyledSpan {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

pub fn plain_text(spans: &[StyledSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}
