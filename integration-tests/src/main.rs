//! Test runner for locale-launcher
//!
//! This test runner validates the launcher end to end by:
//! 1. Using the finalizer to point template copies at the demo binaries
//! 2. Running the finalized launchers from a deliberately polluted environment
//! 3. Checking what the demo binaries report about their argv, environment and stdio
//!
//! Usage: test-runner --launcher <path> --finalizer <path> --test-binaries <dir>
//!
//! Linux only, like the launcher itself.

use clap::Parser;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};

/// Variables the launcher is started with. None of them may reach the target.
const PARENT_ENV: &[(&str, &str)] = &[
    ("PATH", "/usr/local/bin:/usr/bin:/bin"),
    ("LANG", "de_DE.UTF-8"),
    ("LC_ALL", "de_DE.UTF-8"),
    ("LC_NUMERIC", "de_DE.UTF-8"),
    ("LD_LIBRARY_PATH", "/opt/ctffind/lib"),
    ("HOME", "/home/cryoem"),
    ("LAUNCHER_CANARY", "1"),
];

/// Test configuration
#[derive(Debug, Parser)]
#[command(name = "test-runner")]
struct TestConfig {
    /// Path to the locale-launcher template binary
    #[arg(long)]
    launcher: PathBuf,

    /// Path to the finalize-launcher binary
    #[arg(long)]
    finalizer: PathBuf,

    /// Directory containing the demo binaries (print-env, hash-stdin, exit-with)
    #[arg(long)]
    test_binaries: PathBuf,

    /// Working directory for test artifacts
    #[arg(long, default_value_os_t = env::temp_dir().join("locale-launcher-tests"))]
    work_dir: PathBuf,
}

impl TestConfig {
    fn validate(mut self) -> Result<Self, String> {
        if !self.launcher.exists() {
            return Err(format!("Launcher template not found: {}", self.launcher.display()));
        }
        if !self.finalizer.exists() {
            return Err(format!("Finalizer not found: {}", self.finalizer.display()));
        }
        // Targets are embedded as absolute paths
        self.test_binaries = fs::canonicalize(&self.test_binaries).map_err(|e| {
            format!("Test binaries dir not found: {}: {}", self.test_binaries.display(), e)
        })?;
        if self.work_dir.is_relative() {
            let cwd = env::current_dir()
                .map_err(|e| format!("Failed to get current directory: {}", e))?;
            self.work_dir = cwd.join(&self.work_dir);
        }
        Ok(self)
    }

    fn demo_binary(&self, name: &str) -> PathBuf {
        self.test_binaries.join(name)
    }

    fn test_dir(&self, name: &str) -> Result<PathBuf, String> {
        let dir = self.work_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create test dir: {}", e))?;
        Ok(dir)
    }
}

/// Output of one launcher run
struct RunOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl RunOutput {
    fn expect_success(&self) -> Result<(), String> {
        if self.exit_code != 0 {
            return Err(format!(
                "Launcher failed with exit code {}: {}",
                self.exit_code, self.stderr
            ));
        }
        Ok(())
    }

    fn expect_silent_failure(&self, exit_code: i32) -> Result<(), String> {
        if self.exit_code != exit_code {
            return Err(format!(
                "Expected exit code {} but got {}",
                exit_code, self.exit_code
            ));
        }
        if !self.stdout.is_empty() || !self.stderr.is_empty() {
            return Err(format!(
                "Launcher wrote output on failure: stdout={:?} stderr={:?}",
                self.stdout, self.stderr
            ));
        }
        Ok(())
    }

    fn json(&self) -> Result<Value, String> {
        serde_json::from_str(self.stdout.trim())
            .map_err(|e| format!("Invalid print-env output {:?}: {}", self.stdout, e))
    }
}

/// Finalize a launcher pointing at `target`
fn finalize_launcher(
    config: &TestConfig,
    output_path: &Path,
    target: &Path,
    arg0: Option<&str>,
) -> Result<(), String> {
    let mut cmd = Command::new(&config.finalizer);
    cmd.arg("finalize");
    cmd.arg("--template").arg(&config.launcher);
    cmd.arg("--target").arg(target);
    cmd.arg("--output").arg(output_path);
    if let Some(arg0) = arg0 {
        cmd.arg("--arg0").arg(arg0);
    }

    let output = cmd.output().map_err(|e| format!("Failed to run finalizer: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Finalizer failed: {}", stderr));
    }

    Ok(())
}

/// Run a launcher from the polluted parent environment and capture its output
fn run_launcher(
    launcher_path: &Path,
    argv0: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<RunOutput, String> {
    let mut cmd = Command::new(launcher_path);
    cmd.arg0(argv0);
    cmd.args(args);
    cmd.env_clear();
    cmd.envs(PARENT_ENV.iter().copied());
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| format!("Failed to run launcher: {}", e))?;

    if let Some(input) = stdin {
        let mut pipe = child.stdin.take().ok_or("Launcher stdin not captured")?;
        pipe.write_all(input)
            .map_err(|e| format!("Failed to write launcher stdin: {}", e))?;
        // Dropping the pipe closes it so the target sees EOF
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for launcher: {}", e))?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Test: argv[0] is replaced, everything after it is forwarded unchanged
fn test_forwards_arguments(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: forwards_arguments");

    let test_dir = config.test_dir("test_forwards_arguments")?;
    let launcher = test_dir.join("ctffind");
    finalize_launcher(config, &launcher, &config.demo_binary("print-env"), None)?;

    let run = run_launcher(&launcher, "anything", &["-i", "in.mrc", "-o", "out.txt"], None)?;
    run.expect_success()?;

    let report = run.json()?;
    let expected = json!(["ctffind", "-i", "in.mrc", "-o", "out.txt"]);
    if report["args"] != expected {
        return Err(format!("Expected args {} but got {}", expected, report["args"]));
    }
    if !run.stderr.is_empty() {
        return Err(format!("Unexpected stderr: {}", run.stderr));
    }

    println!("    PASS");

    Ok(())
}

/// Test: the target sees LC_ALL=C and nothing else
fn test_environment_replaced(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: environment_replaced");

    let test_dir = config.test_dir("test_environment_replaced")?;
    let launcher = test_dir.join("ctffind");
    finalize_launcher(config, &launcher, &config.demo_binary("print-env"), None)?;

    let run = run_launcher(&launcher, "ctffind", &[], None)?;
    run.expect_success()?;

    let report = run.json()?;
    let expected = json!({ "LC_ALL": "C" });
    if report["env"] != expected {
        return Err(format!("Expected env {} but got {}", expected, report["env"]));
    }

    println!("    PASS");

    Ok(())
}

/// Test: a custom program name from the finalizer
fn test_custom_arg0(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: custom_arg0");

    let test_dir = config.test_dir("test_custom_arg0")?;
    let launcher = test_dir.join("ctffind4");
    finalize_launcher(config, &launcher, &config.demo_binary("print-env"), Some("ctffind4"))?;

    let run = run_launcher(&launcher, "ctffind4", &["--help"], None)?;
    run.expect_success()?;

    let report = run.json()?;
    let expected = json!(["ctffind4", "--help"]);
    if report["args"] != expected {
        return Err(format!("Expected args {} but got {}", expected, report["args"]));
    }

    println!("    PASS");

    Ok(())
}

/// Test: long argument lists are forwarded without truncation
fn test_many_arguments(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: many_arguments");

    let test_dir = config.test_dir("test_many_arguments")?;
    let launcher = test_dir.join("ctffind");
    finalize_launcher(config, &launcher, &config.demo_binary("print-env"), None)?;

    let owned: Vec<String> = (0..2000).map(|i| format!("micrograph_{:04}.mrc", i)).collect();
    let args: Vec<&str> = owned.iter().map(String::as_str).collect();
    let long_arg = "x".repeat(4096);

    let run = run_launcher(&launcher, "ctffind", &args, None)?;
    run.expect_success()?;
    let report = run.json()?;
    let got = report["args"].as_array().ok_or("args is not an array")?;
    if got.len() != args.len() + 1 {
        return Err(format!("Expected {} args but got {}", args.len() + 1, got.len()));
    }
    if got.last() != Some(&json!("micrograph_1999.mrc")) {
        return Err(format!("Last argument mangled: {:?}", got.last()));
    }

    let run = run_launcher(&launcher, "ctffind", &[long_arg.as_str()], None)?;
    run.expect_success()?;
    if run.json()?["args"][1] != json!(long_arg) {
        return Err("Long argument was not forwarded intact".to_string());
    }

    println!("    PASS");

    Ok(())
}

/// Test: a missing target fails with ENOENT and no output
fn test_missing_target(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: missing_target");

    let test_dir = config.test_dir("test_missing_target")?;
    let launcher = test_dir.join("ctffind");
    let target = test_dir.join("does-not-exist").join("ctffind");
    finalize_launcher(config, &launcher, &target, None)?;

    let run = run_launcher(&launcher, "ctffind", &["-i", "in.mrc"], None)?;
    run.expect_silent_failure(2)?;

    println!("    PASS");

    Ok(())
}

/// Test: a target without execute permission fails with EACCES and no output
fn test_non_executable_target(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: non_executable_target");

    let test_dir = config.test_dir("test_non_executable_target")?;
    let target = test_dir.join("ctffind.real");
    fs::write(&target, "#!/bin/sh\necho should not run\n")
        .map_err(|e| format!("Failed to write target: {}", e))?;
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644))
        .map_err(|e| format!("Failed to set permissions: {}", e))?;

    let launcher = test_dir.join("ctffind");
    finalize_launcher(config, &launcher, &target, None)?;

    let run = run_launcher(&launcher, "ctffind", &[], None)?;
    run.expect_silent_failure(13)?;

    println!("    PASS");

    Ok(())
}

/// Test: the unfinalized template refuses to run
fn test_unfinalized_template(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: unfinalized_template");

    let run = run_launcher(&config.launcher, "locale-launcher", &["-i", "in.mrc"], None)?;
    run.expect_silent_failure(127)?;

    println!("    PASS");

    Ok(())
}

/// Test: the target's exit status is the launcher's exit status
fn test_exit_status_passthrough(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: exit_status_passthrough");

    let test_dir = config.test_dir("test_exit_status")?;
    let launcher = test_dir.join("exit-with");
    finalize_launcher(config, &launcher, &config.demo_binary("exit-with"), None)?;

    for code in [0, 3, 42] {
        let run = run_launcher(&launcher, "exit-with", &[code.to_string().as_str()], None)?;
        if run.exit_code != code {
            return Err(format!("Expected exit code {} but got {}", code, run.exit_code));
        }
    }

    println!("    PASS");

    Ok(())
}

/// Test: stdin reaches the target untouched
fn test_stdin_passthrough(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: stdin_passthrough");

    let test_dir = config.test_dir("test_stdin_passthrough")?;
    let launcher = test_dir.join("hash-stdin");
    finalize_launcher(config, &launcher, &config.demo_binary("hash-stdin"), None)?;

    let input: Vec<u8> = (0..=255u8).cycle().take(256 * 1024).collect();
    let expected = format!("SHA256:{:x}", Sha256::digest(&input));

    let run = run_launcher(&launcher, "hash-stdin", &[], Some(&input))?;
    run.expect_success()?;

    if run.stdout.trim() != expected {
        return Err(format!("Expected {} but got {}", expected, run.stdout.trim()));
    }

    println!("    PASS");

    Ok(())
}

/// Test: inspect reports what finalize embedded, and bad targets are rejected
fn test_finalizer(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: finalizer");

    let test_dir = config.test_dir("test_finalizer")?;
    let launcher = test_dir.join("ctffind");
    let target = config.demo_binary("print-env");
    finalize_launcher(config, &launcher, &target, None)?;

    let output = Command::new(&config.finalizer)
        .arg("inspect")
        .arg(&launcher)
        .output()
        .map_err(|e| format!("Failed to run finalizer: {}", e))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = format!("target={}\narg0=ctffind\n", target.display());
    if !output.status.success() || stdout != expected {
        return Err(format!("Unexpected inspect output: {:?}", stdout));
    }

    println!("    PASS (inspect)");

    let rejected = test_dir.join("relative");
    if finalize_launcher(config, &rejected, Path::new("bin/ctffind"), None).is_ok() {
        return Err("Finalizer accepted a relative target".to_string());
    }
    if rejected.exists() {
        return Err("Finalizer wrote output for a rejected target".to_string());
    }

    println!("    PASS (relative target rejected)");

    Ok(())
}

fn main() -> ExitCode {
    println!("=== Locale Launcher Test Suite ===");
    println!();

    let config = match TestConfig::parse().validate() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    // Clean and recreate work directory
    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            eprintln!("Warning: Failed to clean work dir: {}", e);
        }
    }
    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!("Error: Failed to create work dir: {}", e);
        return ExitCode::from(1);
    }

    println!("Configuration:");
    println!("  Launcher:      {}", config.launcher.display());
    println!("  Finalizer:     {}", config.finalizer.display());
    println!("  Test binaries: {}", config.test_binaries.display());
    println!("  Work dir:      {}", config.work_dir.display());
    println!();

    let tests: Vec<(&str, fn(&TestConfig) -> Result<(), String>)> = vec![
        ("forwards_arguments", test_forwards_arguments),
        ("environment_replaced", test_environment_replaced),
        ("custom_arg0", test_custom_arg0),
        ("many_arguments", test_many_arguments),
        ("missing_target", test_missing_target),
        ("non_executable_target", test_non_executable_target),
        ("unfinalized_template", test_unfinalized_template),
        ("exit_status_passthrough", test_exit_status_passthrough),
        ("stdin_passthrough", test_stdin_passthrough),
        ("finalizer", test_finalizer),
    ];

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (name, test_fn) in &tests {
        match test_fn(&config) {
            Ok(()) => {
                passed += 1;
            }
            Err(e) => {
                println!("  FAILED ({}): {}", name, e);
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
