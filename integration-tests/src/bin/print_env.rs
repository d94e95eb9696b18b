//! Demo target: report the argument vector and environment it was started with
//!
//! Usage: print-env [args...]
//! Outputs one JSON object on stdout:
//!   {"args": ["<arg0>", "<arg1>", ...], "env": {"<key>": "<value>", ...}}
//!
//! `env` holds every variable, so a test can tell exactly what the launcher passed on.

use serde_json::json;
use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    // Sorted for stable output
    let env: BTreeMap<String, String> = env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect();

    println!("{}", json!({ "args": args, "env": env }));

    ExitCode::SUCCESS
}
