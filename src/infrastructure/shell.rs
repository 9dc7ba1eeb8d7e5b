//! 쉘 이스케이프(`!cmd`) 실행기.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::application::ports::{ShellStatus, SystemShell};
use crate::domain::tokenizer::split_args;
use crate::infrastructure::config::command_exists;

/// 자식 프로세스로 명령을 실행한다.
/// 표준 출력은 세션 writer로 복사하고 표준 에러는 그대로 물려준다.
#[derive(Debug, Clone, Copy)]
pub struct ProcessShell {
    use_shell: bool,
}

impl Default for ProcessShell {
    fn default() -> Self {
        Self { use_shell: true }
    }
}

impl ProcessShell {
    /// `use_shell`이 false면 줄을 argv로 나눠 직접 실행한다.
    pub fn new(use_shell: bool) -> Self {
        Self { use_shell }
    }

    fn build(&self, command: &str) -> Result<Command> {
        if self.use_shell {
            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C");
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c");
                c
            };
            cmd.arg(command);
            return Ok(cmd);
        }

        let argv = split_args(command);
        let Some((program, args)) = argv.split_first() else {
            bail!("empty system command");
        };
        if !command_exists(program) {
            bail!("program not found in PATH: '{program}'");
        }
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }
}

impl SystemShell for ProcessShell {
    fn run(&self, command: &str, out: &mut dyn Write) -> Result<ShellStatus> {
        debug!(command, shell = self.use_shell, "running system command");
        let mut cmd = self.build(command)?;
        off_runtime(|| run_child(&mut cmd, command, out))
    }
}

/// 멀티스레드 런타임 안에서는 워커 스레드를 비워 두고 블로킹 작업을 돌린다.
fn off_runtime<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn run_child(cmd: &mut Command, command: &str, out: &mut dyn Write) -> Result<ShellStatus> {
    let mut child = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to spawn '{command}'"))?;

    let streamed = match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, out).map(|_| ()),
        None => Ok(()),
    };
    if let Err(err) = streamed.and_then(|()| out.flush()) {
        // 출력을 못 받는 자식은 멈추고 회수한다.
        if let Err(kill_err) = child.kill() {
            warn!(command, "failed to kill system command: {kill_err}");
        }
        let _ = child.wait();
        return Err(err).context("failed to stream command output");
    }

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for '{command}'"))?;
    Ok(ShellStatus {
        success: status.success(),
        code: status.code(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    /// 첫 쓰기부터 실패하는 출력.
    struct ClosedOutput;

    impl Write for ClosedOutput {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn streams_stdout_through_shell() {
        let mut out = Vec::new();
        let status = ProcessShell::default().run("echo hi", &mut out).unwrap();
        assert!(status.success);
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n");
    }

    #[test]
    fn reports_exit_code() {
        let mut out = Vec::new();
        let status = ProcessShell::default().run("exit 3", &mut out).unwrap();
        assert!(!status.success);
        assert_eq!(status.code, Some(3));
    }

    #[test]
    fn argv_mode_keeps_quoted_words() {
        let mut out = Vec::new();
        let status = ProcessShell::new(false)
            .run("echo 'a  b' c", &mut out)
            .unwrap();
        assert!(status.success);
        assert_eq!(String::from_utf8(out).unwrap(), "a  b c\n");
    }

    #[test]
    fn argv_mode_rejects_unknown_program() {
        let mut out = Vec::new();
        let err = ProcessShell::new(false)
            .run("no-such-program-xyz", &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn failed_output_stops_the_child() {
        let started = Instant::now();
        let err = ProcessShell::default()
            .run("echo hi; sleep 30", &mut ClosedOutput)
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to stream command output"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_inside_a_multi_thread_runtime() {
        let mut out = Vec::new();
        let status = ProcessShell::default().run("echo hi", &mut out).unwrap();
        assert!(status.success);
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn runs_inside_a_current_thread_runtime() {
        let mut out = Vec::new();
        let status = ProcessShell::default().run("exit 0", &mut out).unwrap();
        assert!(status.success);
    }
}
