//! Infrastructure layer
//! 포트 구현체: clap 어댑터, 설정 로더, 이력/오류 로그 파일, 쉘 실행기.

pub mod clap_tree;
pub mod config;
pub mod error_log;
pub mod history;
pub mod shell;
