//! Thin wrapper for the external programs the pipeline shells out to
//! (yt-dlp for downloads, ffmpeg for demuxing and encoding).

use std::io;
use std::process::{Command, Output};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0} not found — is it installed and on PATH?")]
    NotFound(String),
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("IO error running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}

/// Run a command to completion, capturing stdout and stderr.
///
/// A non-zero exit is turned into [`ToolError::Failed`] carrying the tail of
/// stderr, which is where both yt-dlp and ffmpeg put their diagnostics.
pub fn run(mut command: Command) -> Result<Output, ToolError> {
    let tool = program_name(&command);
    log::debug!("Running {:?}", command);

    let output = command.output().map_err(|e| spawn_error(&tool, e))?;
    check_status(&tool, output)
}

/// Map a failed spawn to `NotFound` when the executable is missing.
pub fn spawn_error(tool: &str, err: io::Error) -> ToolError {
    if err.kind() == io::ErrorKind::NotFound {
        ToolError::NotFound(tool.to_string())
    } else {
        ToolError::Io {
            tool: tool.to_string(),
            source: err,
        }
    }
}

/// Turn a finished process into `Ok(output)` or `ToolError::Failed`.
pub fn check_status(tool: &str, output: Output) -> Result<Output, ToolError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(ToolError::Failed {
        tool: tool.to_string(),
        status: output.status.to_string(),
        stderr: stderr_tail(&output.stderr),
    })
}

pub fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Last few lines of stderr; ffmpeg prints its whole banner before the error.
fn stderr_tail(stderr: &[u8]) -> String {
    const MAX_LINES: usize = 8;
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join("\n")
}
