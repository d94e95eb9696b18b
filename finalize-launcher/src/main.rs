use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod slots;

/// Points a locale-launcher template at the binary it should exec.
#[derive(Debug, Parser)]
#[command(name = "finalize-launcher", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the target path and program name into a template launcher
    Finalize(FinalizeArgs),
    /// Print the values embedded in a launcher binary
    Inspect {
        /// Launcher binary to read
        binary: PathBuf,
    },
}

#[derive(Debug, Args)]
struct FinalizeArgs {
    /// Template launcher binary
    #[arg(long)]
    template: PathBuf,

    /// Absolute path of the binary to exec
    #[arg(long)]
    target: PathBuf,

    /// Program name the target receives as argv[0]
    #[arg(long, default_value = "ctffind")]
    arg0: String,

    /// Write the launcher here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Result<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Result<&[u8]> {
    path.to_str()
        .map(str::as_bytes)
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}

/// Fills both slots. Nothing is written to `data` unless both values are valid.
fn patch(data: &mut [u8], target: &[u8], arg0: &[u8]) -> Result<()> {
    // The launcher runs on Linux whatever the host is, so check for '/' directly.
    if !target.starts_with(b"/") {
        bail!(
            "target must be an absolute path: {}",
            String::from_utf8_lossy(target)
        );
    }
    slots::TARGET.check(target)?;
    slots::ARG0.check(arg0)?;

    for (slot, value) in [(&slots::TARGET, target), (&slots::ARG0, arg0)] {
        if let Some(previous) = slot.write(data, value)? {
            warn!(
                slot = slot.name,
                previous = %String::from_utf8_lossy(&previous),
                "replacing existing value"
            );
        }
        info!(slot = slot.name, value = %String::from_utf8_lossy(value), "slot written");
    }
    Ok(())
}

fn write_executable(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)
        .with_context(|| format!("failed to write output {}", path.display()))?;

    #[cfg(unix)]
    {
        let mut perms = fs::metadata(path)
            .with_context(|| format!("failed to get metadata of {}", path.display()))?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

fn finalize_launcher(args: &FinalizeArgs) -> Result<()> {
    if let Some(output) = &args.output {
        let template_canon = fs::canonicalize(&args.template).with_context(|| {
            format!("failed to resolve template path {}", args.template.display())
        })?;
        if fs::canonicalize(output).ok().as_ref() == Some(&template_canon) {
            bail!("output path cannot be the same as template path (would overwrite input)");
        }
    }

    let mut data = fs::read(&args.template)
        .with_context(|| format!("failed to read template {}", args.template.display()))?;

    patch(&mut data, path_bytes(&args.target)?, args.arg0.as_bytes())?;

    match &args.output {
        Some(output) => {
            write_executable(output, &data)?;
            info!(output = %output.display(), "finalized launcher written");
        }
        None => io::stdout()
            .lock()
            .write_all(&data)
            .context("failed to write launcher to stdout")?,
    }

    Ok(())
}

fn inspect_launcher(binary: &Path, out: &mut impl Write) -> Result<()> {
    let data =
        fs::read(binary).with_context(|| format!("failed to read {}", binary.display()))?;

    for slot in [&slots::TARGET, &slots::ARG0] {
        let value = slot
            .read(&data)?
            .map(String::from_utf8_lossy)
            .unwrap_or(Cow::Borrowed("<unset>"));
        writeln!(out, "{}={}", slot.name, value)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    // stdout may carry the finalized binary, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Finalize(args) => finalize_launcher(args),
        Command::Inspect { binary } => inspect_launcher(binary, &mut io::stdout().lock()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn template_in(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("locale-launcher");
        fs::write(&path, slots::fake_template()).unwrap();
        path
    }

    fn finalize_args(template: PathBuf, target: &str, output: Option<PathBuf>) -> FinalizeArgs {
        FinalizeArgs {
            template,
            target: PathBuf::from(target),
            arg0: "ctffind".to_string(),
            output,
        }
    }

    fn inspect(path: &Path) -> String {
        let mut out = Vec::new();
        inspect_launcher(path, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn finalize_writes_slots_and_inspect_reads_them() {
        let dir = TempDir::new().unwrap();
        let template = template_in(&dir);
        let output = dir.path().join("ctffind");

        finalize_launcher(&finalize_args(
            template.clone(),
            "/opt/ctffind-4.1.14/bin/ctffind",
            Some(output.clone()),
        ))
        .unwrap();

        assert_eq!(
            inspect(&output),
            "target=/opt/ctffind-4.1.14/bin/ctffind\narg0=ctffind\n"
        );
        // The template itself is untouched.
        assert_eq!(inspect(&template), "target=<unset>\narg0=<unset>\n");
    }

    #[cfg(unix)]
    #[test]
    fn output_is_executable() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("ctffind");

        finalize_launcher(&finalize_args(
            template_in(&dir),
            "/usr/local/bin/ctffind",
            Some(output.clone()),
        ))
        .unwrap();

        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn relative_target_is_rejected() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("ctffind");

        let err = finalize_launcher(&finalize_args(
            template_in(&dir),
            "bin/ctffind",
            Some(output.clone()),
        ))
        .unwrap_err();

        assert_eq!(err.to_string(), "target must be an absolute path: bin/ctffind");
        assert!(!output.exists());
    }

    #[test]
    fn refuses_to_overwrite_template() {
        let dir = TempDir::new().unwrap();
        let template = template_in(&dir);

        let err = finalize_launcher(&finalize_args(
            template.clone(),
            "/usr/local/bin/ctffind",
            Some(template.clone()),
        ))
        .unwrap_err();

        assert!(err.to_string().contains("same as template"));
        assert_eq!(fs::read(&template).unwrap(), slots::fake_template());
    }

    #[test]
    fn oversized_arg0_leaves_buffer_untouched() {
        let mut data = slots::fake_template();
        let arg0 = "c".repeat(slots::ARG0.size);

        assert!(patch(&mut data, b"/usr/local/bin/ctffind", arg0.as_bytes()).is_err());
        assert_eq!(data, slots::fake_template());
    }

    #[test]
    fn refinalizing_points_at_new_target() {
        let mut data = slots::fake_template();
        patch(&mut data, b"/old/ctffind", b"ctffind").unwrap();
        patch(&mut data, b"/new/ctffind", b"ctffind4").unwrap();

        assert_eq!(slots::TARGET.read(&data).unwrap(), Some(&b"/new/ctffind"[..]));
        assert_eq!(slots::ARG0.read(&data).unwrap(), Some(&b"ctffind4"[..]));
    }

    #[test]
    fn inspect_rejects_other_binaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("true");
        fs::write(&path, b"\x7fELF nothing to see").unwrap();

        let err = inspect_launcher(&path, &mut Vec::<u8>::new()).unwrap_err();
        assert!(err.to_string().contains("not a locale-launcher binary"));
    }
}
