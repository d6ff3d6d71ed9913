use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use super::{Frame, FrameEncoder, VideoFormat};
use crate::tools::{self, ToolError};

/// Fourcc tag written into the container for the motion video.
pub const FOURCC: &str = "mp4v";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("no frames to encode")]
    NoFrames,
    #[error("frame {index} is {width}x{height}, expected {expected}")]
    FrameSize {
        index: usize,
        width: u32,
        height: u32,
        expected: VideoFormat,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("failed writing frames to encoder: {0}")]
    Pipe(#[source] io::Error),
}

/// Streams raw RGB frames into ffmpeg's stdin and writes MPEG-4 Part 2
/// tagged `mp4v`.
pub struct FfmpegFrameEncoder {
    ffmpeg: PathBuf,
}

impl FfmpegFrameEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn command(&self, format: &VideoFormat, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", format.width, format.height))
            .arg("-r")
            .arg(format.frame_rate.to_string())
            .args(["-i", "-", "-an", "-c:v", "mpeg4", "-tag:v", FOURCC])
            .arg(output);
        cmd
    }
}

fn check_sizes(frames: &[Frame], format: &VideoFormat) -> Result<(), EncodeError> {
    if frames.is_empty() {
        return Err(EncodeError::NoFrames);
    }
    match frames
        .iter()
        .position(|f| f.width != format.width || f.height != format.height)
    {
        Some(index) => Err(EncodeError::FrameSize {
            index,
            width: frames[index].width,
            height: frames[index].height,
            expected: *format,
        }),
        None => Ok(()),
    }
}

impl FrameEncoder for FfmpegFrameEncoder {
    fn encode(
        &self,
        frames: &[Frame],
        format: &VideoFormat,
        output: &Path,
    ) -> Result<(), EncodeError> {
        check_sizes(frames, format)?;

        let mut cmd = self.command(format, output);
        let tool = tools::program_name(&cmd);
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| tools::spawn_error(&tool, e))?;

        // Dropping stdin at the end of this block closes the pipe so ffmpeg
        // can finish the file.
        let write_result = match child.stdin.take() {
            Some(mut stdin) => {
                // Consecutive frames often share a color; reuse the buffer.
                let mut pixels: Vec<u8> = Vec::new();
                let mut pixels_color: Option<[u8; 3]> = None;
                frames.iter().try_for_each(|frame| {
                    if pixels_color != Some(frame.color) {
                        pixels = frame.to_rgb24();
                        pixels_color = Some(frame.color);
                    }
                    stdin.write_all(&pixels)
                })
            }
            None => Ok(()),
        };

        let output_status = child.wait_with_output().map_err(|e| ToolError::Io {
            tool: tool.clone(),
            source: e,
        })?;
        // A broken pipe usually means ffmpeg bailed; its stderr says why.
        tools::check_status(&tool, output_status)?;
        write_result.map_err(EncodeError::Pipe)?;

        log::info!(
            "Wrote {} frames ({}, {}) to {}",
            frames.len(),
            format,
            FOURCC,
            output.display()
        );
        Ok(())
    }
}
