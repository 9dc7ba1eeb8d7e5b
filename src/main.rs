//! `replpilot` 바이너리 진입점.
//!
//! 인자가 있으면 한 번 실행하고, 없으면 성적부 REPL을 연다.

use std::io;

use replpilot::application::ports::Dispatcher;
use replpilot::application::session::DispatchError;
use replpilot::interface::cli::{AppComposition, run_repl};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let composition = match AppComposition::load() {
        Ok(composition) => composition,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        if let Err(err) = run_repl(&composition).await {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
        return;
    }

    let dispatcher = match composition.dispatcher() {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    match dispatcher.invoke_once(&args, &mut stdout, &mut stderr) {
        Ok(_) | Err(DispatchError::Exit) => {}
        Err(err @ DispatchError::Usage { .. }) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
        Err(DispatchError::Failed(err)) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
