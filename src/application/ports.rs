//! 애플리케이션 계층이 의존하는 포트(추상 인터페이스) 모음.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::application::assist::PromptFrame;
use crate::application::session::{DispatchContext, DispatchError, Invocation};
use crate::domain::tree::CommandTree;

/// 명령 트리를 제공하고 완성된 명령 줄을 실행하는 호스트 프레임워크 포트.
pub trait Dispatcher {
    fn tree(&self) -> Arc<CommandTree>;

    /// 토큰 목록을 해석해 실행한다. REPL과 단발 실행이 같은 경로를 쓴다.
    fn dispatch(&self, args: &[String], invocation: &mut Invocation<'_>) -> Result<(), DispatchError>;

    /// 새 컨텍스트로 한 번만 실행한다(비 REPL 경로).
    fn invoke_once(
        &self,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<DispatchContext, DispatchError> {
        let mut ctx = DispatchContext::new();
        let mut invocation = Invocation::one_shot(&mut ctx, out, err);
        self.dispatch(args, &mut invocation)?;
        Ok(ctx)
    }
}

/// 한 줄 읽기 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// 빈 줄에서의 키보드 인터럽트.
    Interrupted,
    Eof,
}

/// 줄 편집 프런트엔드 포트.
#[async_trait(?Send)]
pub trait LineReader {
    async fn read_line(&mut self, frame: &mut PromptFrame<'_>) -> Result<ReadOutcome>;
}

/// 입력 이력 저장소. 추가만 하며 중복을 제거하지 않는다.
pub trait History: Send {
    fn entries(&self) -> &[String];
    fn append(&mut self, line: &str) -> Result<()>;
}

/// 일반 오류를 영구 기록하는 포트.
pub trait ErrorSink: Send + Sync {
    fn record(&self, kind: &str, message: &str, causes: &[String]) -> Result<()>;
}

/// 시스템 명령 종료 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellStatus {
    pub success: bool,
    pub code: Option<i32>,
}

/// 쉘 이스케이프 실행 포트. 표준 출력은 `out`으로 흘려보낸다.
pub trait SystemShell: Send + Sync {
    fn run(&self, command: &str, out: &mut dyn Write) -> Result<ShellStatus>;
}
