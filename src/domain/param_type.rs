//! 파라미터 값 타입(닫힌 열거형)과 타입별 값 검사 규칙.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

/// boolean 값으로 인정하는 참 별칭.
pub const BOOL_TRUE_ALIASES: [&str; 6] = ["1", "true", "t", "yes", "y", "on"];
/// boolean 값으로 인정하는 거짓 별칭.
pub const BOOL_FALSE_ALIASES: [&str; 6] = ["0", "false", "f", "no", "n", "off"];

pub const DEFAULT_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Any,
    File,
    Dir,
}

/// 파라미터가 받는 값의 종류.
/// 완성 전략과 상태바 표기는 이 태그 기준으로 분기한다.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Bool,
    Choice {
        choices: Vec<String>,
        case_sensitive: bool,
    },
    Path {
        kind: PathKind,
        must_exist: bool,
    },
    /// 열거나 쓸 파일 이름(`-`는 표준 입출력).
    File,
    IntRange {
        min: Option<i64>,
        max: Option<i64>,
    },
    FloatRange {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// 고정 길이 복합 값. 각 위치마다 별도 타입을 가진다.
    Tuple(Vec<ParamType>),
    DateTime {
        formats: Vec<String>,
    },
    Uuid,
    /// 가공 없이 그대로 넘기는 값.
    Unprocessed,
}

impl ParamType {
    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choice {
            choices: choices.into_iter().map(Into::into).collect(),
            case_sensitive: true,
        }
    }

    pub fn path() -> Self {
        Self::Path {
            kind: PathKind::Any,
            must_exist: false,
        }
    }

    pub fn directory() -> Self {
        Self::Path {
            kind: PathKind::Dir,
            must_exist: false,
        }
    }

    pub fn datetime() -> Self {
        Self::DateTime {
            formats: DEFAULT_DATETIME_FORMATS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        }
    }

    /// 상태바/에러 메시지에 쓰는 타입 이름.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::Choice { .. } => "choice",
            Self::Path {
                kind: PathKind::Dir,
                ..
            } => "directory",
            Self::Path {
                kind: PathKind::File,
                ..
            } => "file",
            Self::Path { .. } => "path",
            Self::File => "filename",
            Self::IntRange { .. } => "integer range",
            Self::FloatRange { .. } => "float range",
            Self::Tuple(_) => "tuple",
            Self::DateTime { .. } => "datetime",
            Self::Uuid => "uuid",
            Self::Unprocessed => "unprocessed",
        }
    }

    /// 자체 완성/타입 표기가 필요 없는 문자열 계열 타입인지 여부.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Unprocessed)
    }

    /// 튜플이면 `index`번째 원소 타입, 아니면 자기 자신.
    pub fn element(&self, index: usize) -> &ParamType {
        match self {
            Self::Tuple(types) => types.get(index).unwrap_or(self),
            _ => self,
        }
    }

    /// 튜플 길이(튜플이 아니면 None).
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Tuple(types) => Some(types.len()),
            _ => None,
        }
    }

    /// 범위 타입의 경계를 `0<=x<=10` 형태로 표기한다.
    pub fn describe_range(&self) -> Option<String> {
        match self {
            Self::IntRange { min, max } => Some(describe_bounds(*min, *max)),
            Self::FloatRange { min, max } => Some(describe_bounds(*min, *max)),
            _ => None,
        }
    }

    /// `index`번째 값을 검사한다. 튜플은 해당 위치의 원소 타입으로 검사한다.
    pub fn check_at(&self, index: usize, value: &str) -> Result<(), String> {
        self.element(index).check(value)
    }

    /// 완성된 값 하나를 타입 규칙으로 검사한다.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            Self::String | Self::Unprocessed | Self::File | Self::Tuple(_) => Ok(()),
            Self::Integer => parse_int(value).map(|_| ()),
            Self::Float => parse_float(value).map(|_| ()),
            Self::Bool => parse_bool(value).map(|_| ()),
            Self::Choice {
                choices,
                case_sensitive,
            } => {
                let found = choices.iter().any(|choice| {
                    if *case_sensitive {
                        choice == value
                    } else {
                        choice.eq_ignore_ascii_case(value)
                    }
                });
                if found {
                    Ok(())
                } else {
                    let listed = choices
                        .iter()
                        .map(|c| format!("'{c}'"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(format!("'{value}' is not one of {listed}."))
                }
            }
            Self::Path { kind, must_exist } => check_path(value, *kind, *must_exist),
            Self::IntRange { min, max } => {
                let parsed = parse_int(value)?;
                if min.is_some_and(|m| parsed < m) || max.is_some_and(|m| parsed > m) {
                    return Err(format!(
                        "{value} is not in the range {}.",
                        describe_bounds(*min, *max)
                    ));
                }
                Ok(())
            }
            Self::FloatRange { min, max } => {
                let parsed = parse_float(value)?;
                if min.is_some_and(|m| parsed < m) || max.is_some_and(|m| parsed > m) {
                    return Err(format!(
                        "{value} is not in the range {}.",
                        describe_bounds(*min, *max)
                    ));
                }
                Ok(())
            }
            Self::DateTime { formats } => {
                let trimmed = value.trim();
                let matched = formats.iter().any(|format| {
                    NaiveDateTime::parse_from_str(trimmed, format).is_ok()
                        || NaiveDate::parse_from_str(trimmed, format).is_ok()
                });
                if matched {
                    Ok(())
                } else {
                    let listed = formats
                        .iter()
                        .map(|f| format!("'{f}'"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(format!("'{value}' does not match the formats {listed}."))
                }
            }
            Self::Uuid => uuid::Uuid::parse_str(value.trim())
                .map(|_| ())
                .map_err(|_| format!("'{value}' is not a valid UUID.")),
        }
    }
}

/// boolean 별칭을 해석한다.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    let lower = value.trim().to_ascii_lowercase();
    if BOOL_TRUE_ALIASES.contains(&lower.as_str()) {
        return Ok(true);
    }
    if BOOL_FALSE_ALIASES.contains(&lower.as_str()) {
        return Ok(false);
    }
    Err(format!("'{value}' is not a valid boolean."))
}

fn parse_int(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'{value}' is not a valid integer."))
}

fn parse_float(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{value}' is not a valid float."))
}

fn check_path(value: &str, kind: PathKind, must_exist: bool) -> Result<(), String> {
    if !must_exist {
        return Ok(());
    }

    let path = Path::new(value);
    if !path.exists() {
        return Err(format!("Path '{value}' does not exist."));
    }
    match kind {
        PathKind::File if path.is_dir() => Err(format!("File '{value}' is a directory.")),
        PathKind::Dir if !path.is_dir() => Err(format!("Directory '{value}' is a file.")),
        _ => Ok(()),
    }
}

fn describe_bounds<T: std::fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{lo}<=x<={hi}"),
        (Some(lo), None) => format!("x>={lo}"),
        (None, Some(hi)) => format!("x<={hi}"),
        (None, None) => "x".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_checks() {
        assert!(ParamType::Integer.check("42").is_ok());
        assert_eq!(
            ParamType::Integer.check("4x").unwrap_err(),
            "'4x' is not a valid integer."
        );
        assert!(ParamType::Float.check("3.5").is_ok());
        assert!(ParamType::Float.check("abc").is_err());
    }

    #[test]
    fn range_reports_bounds() {
        let ty = ParamType::IntRange {
            min: Some(0),
            max: Some(100),
        };
        assert!(ty.check("50").is_ok());
        assert_eq!(
            ty.check("101").unwrap_err(),
            "101 is not in the range 0<=x<=100."
        );
        assert_eq!(ty.describe_range().as_deref(), Some("0<=x<=100"));
    }

    #[test]
    fn choice_respects_case_sensitivity() {
        let strict = ParamType::choice(["math", "art"]);
        assert!(strict.check("math").is_ok());
        assert_eq!(
            strict.check("MATH").unwrap_err(),
            "'MATH' is not one of 'math', 'art'."
        );

        let relaxed = ParamType::Choice {
            choices: vec!["math".to_string()],
            case_sensitive: false,
        };
        assert!(relaxed.check("MATH").is_ok());
    }

    #[test]
    fn bool_aliases() {
        assert_eq!(parse_bool("Yes"), Ok(true));
        assert_eq!(parse_bool("off"), Ok(false));
        assert!(ParamType::Bool.check("maybe").is_err());
    }

    #[test]
    fn tuple_checks_each_position_with_its_type() {
        let ty = ParamType::Tuple(vec![ParamType::String, ParamType::Integer]);
        assert!(ty.check_at(0, "anything").is_ok());
        assert!(ty.check_at(1, "7").is_ok());
        assert!(ty.check_at(1, "seven").is_err());
        assert_eq!(ty.arity(), Some(2));
    }

    #[test]
    fn datetime_and_uuid() {
        let dt = ParamType::datetime();
        assert!(dt.check("2024-02-29").is_ok());
        assert!(dt.check("2024-02-29 10:11:12").is_ok());
        assert!(dt.check("29/02/2024").is_err());

        assert!(ParamType::Uuid
            .check("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .is_ok());
        assert!(ParamType::Uuid.check("not-a-uuid").is_err());
    }

    #[test]
    fn existing_path_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let dir_ty = ParamType::Path {
            kind: PathKind::Dir,
            must_exist: true,
        };
        assert!(dir_ty.check(dir.path().to_str().unwrap()).is_ok());
        assert!(dir_ty.check(file.to_str().unwrap()).is_err());
        assert!(dir_ty.check("/definitely/not/here").is_err());
        assert!(ParamType::path().check("/definitely/not/here").is_ok());
    }
}
