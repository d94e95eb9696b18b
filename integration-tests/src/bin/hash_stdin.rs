//! Demo target: hash everything read from stdin
//!
//! Usage: hash-stdin
//! Outputs: SHA256:<hex>

use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut content = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut content) {
        eprintln!("Error reading stdin: {}", e);
        return ExitCode::from(1);
    }

    let hash = Sha256::digest(&content);
    println!("SHA256:{:x}", hash);

    ExitCode::SUCCESS
}
