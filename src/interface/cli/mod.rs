//! CLI 인터페이스 모듈 묶음.
//! 명령 정의/REPL/줄 편집/렌더링/조립을 한 네임스페이스로 관리한다.

pub mod command;
pub mod composition;
pub mod render;
pub mod repl;
pub mod repl_input;

pub use command::{SchoolCli, school_dispatcher};
pub use composition::AppComposition;
pub use repl::run_repl;
pub use repl_input::{PlainLineReader, TerminalLineReader};
