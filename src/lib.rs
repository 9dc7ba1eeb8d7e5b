//! replpilot library root.
//! clap 명령 트리를 대화형 REPL로 감싸는 계층(domain/application/infrastructure/interface)을 노출한다.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interface;
