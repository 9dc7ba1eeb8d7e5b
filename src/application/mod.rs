//! Application layer
//! REPL 엔진(완성/검증/상태바/세션)을 정의하고 포트를 통해 인프라를 사용한다.

pub mod assist;
pub mod completion;
pub mod config;
pub mod internal_commands;
pub mod marquee;
pub mod ports;
pub mod session;
pub mod status_bar;
pub mod validation;
