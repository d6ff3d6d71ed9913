use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::tools::{self, ToolError};

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("input video {0} does not exist")]
    MissingInput(PathBuf),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Re-encodes a synthesized video into the delivery format.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// H.264 (libx264, yuv420p) via ffmpeg with a fixed thread count.
pub struct X264Transcoder {
    ffmpeg: PathBuf,
    threads: u32,
}

impl X264Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, threads: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            threads: threads.max(1),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-preset", "medium", "-movflags", "+faststart"])
            .arg("-threads")
            .arg(self.threads.to_string())
            .arg(output);
        cmd
    }
}

impl Transcoder for X264Transcoder {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        if !input.exists() {
            return Err(TranscodeError::MissingInput(input.to_path_buf()));
        }
        log::info!(
            "Transcoding {} -> {} (libx264, {} threads)",
            input.display(),
            output.display(),
            self.threads
        );
        tools::run(self.command(input, output))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let t = X264Transcoder::new("ffmpeg", 4);
        let cmd = t.command(Path::new("motion.mp4"), Path::new("static/real.mp4"));
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-threads", "4"]));
        assert!(args.windows(2).any(|w| w == ["-i", "motion.mp4"]));
        assert_eq!(args.last().map(String::as_str), Some("static/real.mp4"));
    }

    #[test]
    fn test_zero_threads_clamped() {
        let t = X264Transcoder::new("ffmpeg", 0);
        assert_eq!(t.threads, 1);
    }

    #[test]
    fn test_missing_input() {
        let t = X264Transcoder::new("ffmpeg", 4);
        let err = t
            .transcode(Path::new("/nonexistent/motion.mp4"), Path::new("/tmp/out.mp4"))
            .unwrap_err();
        assert!(matches!(err, TranscodeError::MissingInput(_)));
    }
}
