//! # Stream Pump
//!
//! Filter-mode tools read the image from stdin and write the result to
//! stdout. Both directions are pumped by their own task, concurrently with
//! the process and with each other: a tool that starts writing before it
//! has consumed all of its input would otherwise block on a full pipe
//! buffer while we block feeding it.
//!
//! - **feeder**: source bytes → child stdin, then closes stdin
//! - **drainer**: child stdout → temp file, then flushes and closes it
//! - **diagnostics**: child stderr → memory, joined with the same bound
//!
//! The pumps must be joined before the temp file's size means anything.
//! Each join is bounded; expiry is reported as [`PumpError::Timeout`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes fed to a filter tool
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Raw contents of a file on disk
    File(PathBuf),
    /// An in-memory buffer, e.g. an intermediate bitmap
    Bytes(Arc<[u8]>),
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes.into())
    }
}

/// Which side of the pipe a pump serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpTask {
    Input,
    Output,
    Diagnostics,
}

impl fmt::Display for PumpTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpTask::Input => write!(f, "input feeder"),
            PumpTask::Output => write!(f, "output drainer"),
            PumpTask::Diagnostics => write!(f, "diagnostics reader"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PumpError {
    #[error("{task} did not finish within {after:?}")]
    Timeout { task: PumpTask, after: Duration },

    #[error("{task} failed: {source}")]
    Io {
        task: PumpTask,
        #[source]
        source: io::Error,
    },
}

/// The two running copy tasks of one filter invocation
pub struct StreamPump {
    feeder: JoinHandle<io::Result<u64>>,
    drainer: JoinHandle<io::Result<u64>>,
}

impl StreamPump {
    /// Start both copy tasks
    pub fn start(source: InputSource, stdin: ChildStdin, stdout: ChildStdout, dest: File) -> Self {
        Self {
            feeder: tokio::spawn(feed(source, stdin)),
            drainer: tokio::spawn(drain(stdout, dest)),
        }
    }

    /// Wait for both pumps, giving each at most `timeout`.
    ///
    /// Returns the number of bytes written to the output file. A feeder
    /// that hit a closed pipe is not an error: the tool is allowed to stop
    /// reading once it has what it needs.
    pub async fn join(mut self, timeout: Duration) -> Result<u64, PumpError> {
        let written = match Self::join_one(&mut self.drainer, PumpTask::Output, timeout).await {
            Ok(written) => written,
            Err(e) => {
                self.feeder.abort();
                return Err(e);
            }
        };

        match Self::join_one(&mut self.feeder, PumpTask::Input, timeout).await {
            Ok(fed) => debug!("Pumped {} bytes in, {} bytes out", fed, written),
            Err(PumpError::Io { source, .. }) if source.kind() == io::ErrorKind::BrokenPipe => {
                warn!("Filter closed its input early; keeping {} bytes of output", written);
            }
            Err(e) => return Err(e),
        }

        Ok(written)
    }

    async fn join_one<T>(
        handle: &mut JoinHandle<io::Result<T>>,
        task: PumpTask,
        timeout: Duration,
    ) -> Result<T, PumpError> {
        match tokio::time::timeout(timeout, &mut *handle).await {
            Err(_) => {
                handle.abort();
                Err(PumpError::Timeout { task, after: timeout })
            }
            Ok(Err(join_error)) => Err(PumpError::Io {
                task,
                source: io::Error::other(join_error.to_string()),
            }),
            Ok(Ok(result)) => result.map_err(|source| PumpError::Io { task, source }),
        }
    }

    /// Stop both pumps without waiting for them
    pub fn abort(self) {
        self.feeder.abort();
        self.drainer.abort();
    }
}

/// Background reader collecting a child's stderr
pub struct DiagnosticsReader {
    handle: JoinHandle<io::Result<Vec<u8>>>,
}

impl DiagnosticsReader {
    pub fn start(mut stderr: ChildStderr) -> Self {
        Self {
            handle: tokio::spawn(async move {
                let mut raw = Vec::new();
                stderr.read_to_end(&mut raw).await?;
                Ok(raw)
            }),
        }
    }

    /// Wait at most `timeout` for stderr to close and return its text.
    /// Stderr stays open as long as any process holds it, so a detached
    /// helper of the tool can keep it open past the tool's exit.
    pub async fn join(mut self, timeout: Duration) -> Result<String, PumpError> {
        let raw = StreamPump::join_one(&mut self.handle, PumpTask::Diagnostics, timeout).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

async fn feed(source: InputSource, mut stdin: ChildStdin) -> io::Result<u64> {
    let fed = match source {
        InputSource::File(path) => {
            let mut file = File::open(&path).await?;
            tokio::io::copy(&mut file, &mut stdin).await?
        }
        InputSource::Bytes(bytes) => {
            stdin.write_all(&bytes).await?;
            bytes.len() as u64
        }
    };
    stdin.flush().await?;
    drop(stdin);
    Ok(fed)
}

async fn drain(mut stdout: ChildStdout, mut dest: File) -> io::Result<u64> {
    let written = tokio::io::copy(&mut stdout, &mut dest).await?;
    dest.flush().await?;
    dest.sync_all().await?;
    Ok(written)
}
