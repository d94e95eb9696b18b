//! Demo target: exit with the status given as the first argument
//!
//! Usage: exit-with <code>

use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(code) = env::args().nth(1) else {
        eprintln!("Usage: exit-with <code>");
        return ExitCode::from(1);
    };

    match code.parse::<u8>() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error parsing '{}' as exit code: {}", code, e);
            ExitCode::from(1)
        }
    }
}
