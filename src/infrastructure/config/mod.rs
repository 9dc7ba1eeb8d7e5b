//! REPL 설정(JSON) 로딩/병합 모듈.
//! 여러 경로의 설정을 우선순위대로 병합하고, 어떤 파일이 읽혔는지 함께 돌려준다.

mod loader;
mod utils;

pub use loader::{CONFIG_ENV, LoadedConfig, config_paths, load_from_paths, load_repl_config};
pub use utils::command_exists;
