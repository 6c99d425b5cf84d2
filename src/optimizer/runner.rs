//! # Process Runner
//!
//! Launches an optimizer with its working directory set to the source
//! file's directory, so the basenames substituted into the template
//! resolve correctly.
//!
//! Arguments and the working directory travel as `OsStr`; the standard
//! library converts them to whatever the host's process API wants (UTF-16
//! on Windows), so non-ASCII paths need no special casing here.

use super::command::CommandTemplate;
use crate::error::{OptimizeError, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Exit status plus the tool's diagnostic text
#[derive(Debug)]
pub struct ProcessResult {
    pub status: ExitStatus,
    /// stdout followed by stderr for in-place tools, stderr only for filters
    pub diagnostics: String,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

fn build_command(template: &CommandTemplate, args: Vec<OsString>, cwd: &Path) -> Command {
    let mut command = Command::new(template.program());
    command.args(&args).current_dir(cwd).stdout(Stdio::piped()).stderr(Stdio::piped());

    #[cfg(windows)]
    command.creation_flags(DETACHED_PROCESS);

    debug!("Command: {:?} {:?} (cwd: {})", template.program(), args, cwd.display());
    command
}

fn spawn(mut command: Command, template: &CommandTemplate) -> Result<Child> {
    command.spawn().map_err(|source| OptimizeError::Spawn {
        tool: template.display_name(),
        source,
    })
}

/// Run an in-place tool to completion, substituting the file basenames
pub async fn run_in_place(
    template: &CommandTemplate,
    input_name: &OsStr,
    output_name: &OsStr,
    cwd: &Path,
) -> Result<ProcessResult> {
    let mut command = build_command(template, template.render(input_name, output_name), cwd);
    command.stdin(Stdio::null());

    let start_time = std::time::Instant::now();
    let output = spawn(command, template)?.wait_with_output().await?;
    debug!("{} finished with {} after {:?}", template.display_name(), output.status, start_time.elapsed());

    let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
    diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ProcessResult {
        status: output.status,
        diagnostics,
    })
}

/// Spawn a filter tool with all three standard streams piped
pub fn spawn_filter(template: &CommandTemplate, cwd: &Path) -> Result<Child> {
    let mut command = build_command(template, template.render_filter(), cwd);
    command.stdin(Stdio::piped());
    spawn(command, template)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_place_runs_in_source_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.txt"), b"payload").unwrap();

        let template = CommandTemplate::new("cp").input().output();
        let result = run_in_place(&template, OsStr::new("in.txt"), OsStr::new("out.txt"), dir.path())
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(std::fs::read(dir.path().join("out.txt")).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_in_place_merges_diagnostics() {
        let dir = TempDir::new().unwrap();
        let template = CommandTemplate::new("sh")
            .args(["-c", "echo to-stdout; echo to-stderr >&2; exit 4"])
            .input()
            .output();

        let result = run_in_place(&template, OsStr::new("a"), OsStr::new("b"), dir.path())
            .await
            .unwrap();

        assert!(!result.success());
        assert_eq!(result.code(), Some(4));
        assert!(result.diagnostics.contains("to-stdout"));
        assert!(result.diagnostics.contains("to-stderr"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let template = CommandTemplate::new("no-such-optimizer-binary").input().output();

        let err = run_in_place(&template, OsStr::new("a"), OsStr::new("b"), dir.path())
            .await
            .unwrap_err();

        match err {
            OptimizeError::Spawn { tool, .. } => assert_eq!(tool, "no-such-optimizer-binary"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
