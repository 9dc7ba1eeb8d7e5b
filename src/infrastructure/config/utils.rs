//! 쉘 이스케이프가 쓰는 실행 파일 탐지 유틸리티.

use std::env;
use std::path::Path;

/// 프로그램이 경로로 주어지면 파일 존재를, 이름이면 PATH를 확인한다.
pub fn command_exists(program: &str) -> bool {
    let program = program.trim();
    if program.is_empty() {
        return false;
    }

    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file();
    }

    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };

    env::split_paths(&path_var).any(|dir| {
        if dir.join(program).is_file() {
            return true;
        }
        // Windows는 확장자를 생략할 수 있다.
        cfg!(windows)
            && as_path.extension().is_none()
            && windows_extensions()
                .iter()
                .any(|ext| dir.join(format!("{program}{ext}")).is_file())
    })
}

fn windows_extensions() -> Vec<String> {
    env::var_os("PATHEXT")
        .unwrap_or_else(|| ".EXE;.CMD;.BAT;.COM".into())
        .to_string_lossy()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
