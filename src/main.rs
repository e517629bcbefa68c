//! Thin command-line wrapper around the engine.
//!
//! With arguments, executes them as a single command and exits — 0 on
//! success, non-zero on a usage error. Without arguments, runs a
//! line-oriented REPL over stdin.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use memoriadb::shell::{Shell, ShellError};
use memoriadb::{Engine, EngineConfig};

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let mut shell = Shell::new(Engine::new(EngineConfig::default()));

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return run_once(&mut shell, &args.join(" "));
    }

    repl(&mut shell)
}

/// Execute one command and exit with a meaningful status.
fn run_once(shell: &mut Shell, line: &str) -> ExitCode {
    match shell.handle_line(line) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error}");
            match error {
                ShellError::Usage(_) => ExitCode::from(2),
                ShellError::Engine(_) => ExitCode::FAILURE,
            }
        }
    }
}

/// Read-eval-print loop. Usage errors are printed and the loop goes on;
/// EOF ends the session.
fn repl(shell: &mut Shell) -> ExitCode {
    println!("memoriadb — in-process LSM engine (HELP for commands, ctrl-d to quit)");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            return ExitCode::FAILURE;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS, // EOF
            Ok(_) => {}
            Err(error) => {
                eprintln!("error: {error}");
                return ExitCode::FAILURE;
            }
        }

        match shell.handle_line(&line) {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{output}");
                }
            }
            Err(error) => eprintln!("error: {error}"),
        }
    }
}
