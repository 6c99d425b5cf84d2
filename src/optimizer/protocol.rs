//! # Optimizer Protocol
//!
//! Runs one external optimizer against one file and swaps the result back
//! into place.
//!
//! ## Flusso di esecuzione:
//! 1. **Prepared**: path assoluto, working directory, file temporaneo
//! 2. **Running**: tool in-place oppure filter con i due pump
//! 3. **Decision**:
//!    - exit code != 0 → `Failed` con il testo diagnostico del tool
//!    - output vuoto → `Failed` con "`<tool>` returned a zero size image"
//!    - altrimenti → copia permessi/timestamp e rename atomico sull'originale
//! 4. **Cleaned up**: file temporaneo e `.bak` rimossi in ogni caso
//!
//! On failure the original file keeps its bytes and metadata. Two runs on
//! the *same* path must not overlap; distinct paths are independent.

use super::command::{CommandMode, CommandTemplate};
use super::pump::{DiagnosticsReader, InputSource, PumpError, PumpTask, StreamPump};
use super::runner;
use super::workspace::TempArtifact;
use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the tool receives the image
#[derive(Debug, Clone)]
pub enum Mode {
    /// Tool reads the source and writes the temp file by name
    InPlace,
    /// Tool reads `InputSource` from stdin and writes stdout
    Filter(InputSource),
}

impl Mode {
    fn command_mode(&self) -> CommandMode {
        match self {
            Mode::InPlace => CommandMode::InPlace,
            Mode::Filter(_) => CommandMode::Filter,
        }
    }
}

/// Why a run was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Tool exited unsuccessfully (`None` when killed by a signal)
    ToolExit(Option<i32>),
    /// Tool succeeded but wrote nothing
    EmptyOutput,
    /// A stream pump outlived its bounded join
    PumpTimeout(PumpTask),
    /// A stream pump failed with an I/O error
    PumpIo(PumpTask),
}

/// A rejected run: the original file was left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Failure {}

/// Result of a completed protocol run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The source now holds the optimized bytes
    Replaced,
    Failed(Failure),
}

impl Outcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Outcome::Replaced)
    }

    /// The diagnostic text, if the run failed
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Outcome::Replaced => None,
            Outcome::Failed(failure) => Some(&failure.message),
        }
    }

    pub fn into_result(self) -> std::result::Result<(), Failure> {
        match self {
            Outcome::Replaced => Ok(()),
            Outcome::Failed(failure) => Err(failure),
        }
    }
}

fn failed(kind: FailureKind, message: impl Into<String>) -> Outcome {
    Outcome::Failed(Failure {
        kind,
        message: message.into(),
    })
}

/// Run `command` against `file_path` and replace the file on success.
///
/// Returns `Err` only for fatal problems: the tool could not be launched,
/// the filesystem misbehaved, or the temp artifact could not be deleted
/// (reported even when the optimization itself succeeded).
pub async fn run_optimizer(
    file_path: &Path,
    command: &CommandTemplate,
    mode: Mode,
    pump_timeout: Duration,
) -> Result<Outcome> {
    command.validate(mode.command_mode())?;

    let source = absolute(file_path)?;
    let cwd = source
        .parent()
        .ok_or_else(|| OptimizeError::Validation(format!("{} has no parent directory", source.display())))?
        .to_path_buf();

    let keep_open = matches!(mode, Mode::Filter(_));
    let (artifact, handle) = TempArtifact::allocate(&source, keep_open)?;

    let result = execute(&source, &cwd, &artifact, handle, command, mode, pump_timeout).await;
    let cleanup = artifact.cleanup();

    match (result, cleanup) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(cleanup_error)) => Err(cleanup_error),
        (Err(e), cleanup) => {
            if let Err(cleanup_error) = cleanup {
                warn!("Cleanup after failed run also failed: {}", cleanup_error);
            }
            Err(e)
        }
    }
}

async fn execute(
    source: &Path,
    cwd: &Path,
    artifact: &TempArtifact,
    handle: Option<std::fs::File>,
    command: &CommandTemplate,
    mode: Mode,
    pump_timeout: Duration,
) -> Result<Outcome> {
    let tool = command.display_name();
    let original_size = FileManager::size_or_zero(source).await;

    match mode {
        Mode::InPlace => {
            let input_name = source.file_name().unwrap_or_default();
            let output_name = artifact.path().file_name().unwrap_or_default();

            let result = runner::run_in_place(command, input_name, output_name, cwd).await?;
            if !result.success() {
                return Ok(tool_exit(&tool, result.code(), result.diagnostics));
            }
        }
        Mode::Filter(input) => {
            let handle = handle.ok_or_else(|| {
                OptimizeError::Validation("filter mode requires an open output handle".to_string())
            })?;

            let mut child = runner::spawn_filter(command, cwd)?;
            let (Some(stdin), Some(stdout), Some(stderr)) =
                (child.stdin.take(), child.stdout.take(), child.stderr.take())
            else {
                return Err(OptimizeError::Validation(format!("{} was spawned without pipes", tool)));
            };

            let pump = StreamPump::start(input, stdin, stdout, tokio::fs::File::from_std(handle));
            let diagnostics = DiagnosticsReader::start(stderr);
            let status = child.wait().await?;

            let diagnostics = match diagnostics.join(pump_timeout).await {
                Ok(text) => text,
                Err(e) => {
                    pump.abort();
                    return Ok(pump_failure(&tool, e));
                }
            };

            if !status.success() {
                pump.abort();
                return Ok(tool_exit(&tool, status.code(), diagnostics));
            }

            if let Err(e) = pump.join(pump_timeout).await {
                return Ok(pump_failure(&tool, e));
            }
        }
    }

    let optimized_size = FileManager::size_or_zero(artifact.path()).await;
    if optimized_size < 1 {
        return Ok(failed(
            FailureKind::EmptyOutput,
            format!("{} returned a zero size image", tool),
        ));
    }

    FileManager::copy_stat(source, artifact.path()).await?;
    FileManager::atomic_replace(artifact.path(), source).await?;

    info!(
        "{}: {} -> {} ({:.1}% saved) with {}",
        source.display(),
        FileManager::format_size(original_size),
        FileManager::format_size(optimized_size),
        FileManager::calculate_reduction(original_size, optimized_size),
        tool
    );
    Ok(Outcome::Replaced)
}

fn pump_failure(tool: &str, e: PumpError) -> Outcome {
    let message = format!("{}: {}", tool, e);
    warn!("{}", message);
    let kind = match e {
        PumpError::Timeout { task, .. } => FailureKind::PumpTimeout(task),
        PumpError::Io { task, .. } => FailureKind::PumpIo(task),
    };
    failed(kind, message)
}

fn tool_exit(tool: &str, code: Option<i32>, diagnostics: String) -> Outcome {
    let message = if diagnostics.trim().is_empty() {
        match code {
            Some(code) => format!("{} exited with status {}", tool, code),
            None => format!("{} was terminated by a signal", tool),
        }
    } else {
        diagnostics
    };
    debug!("{} failed: {}", tool, message.trim_end());
    failed(FailureKind::ToolExit(code), message)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
