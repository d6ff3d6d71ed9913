pub mod info;

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::tools::{self, ToolError};
pub use info::MediaInfo;

/// Name of the downloaded container inside a request workspace.
pub const VIDEO_FILENAME: &str = "video.mp4";
/// Name of the demuxed audio track inside a request workspace.
pub const AUDIO_FILENAME: &str = "audio.mp3";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Download(#[source] ToolError),
    #[error("audio extraction failed: {0}")]
    Demux(#[source] ToolError),
    #[error("download reported success but {0} is missing")]
    MissingOutput(PathBuf),
}

/// Local copies of a remote video's media.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub info: Option<MediaInfo>,
}

/// Resolves a URL to a local video/audio file pair inside `workspace`.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, workspace: &Path) -> Result<FetchedMedia, FetchError>;
}

/// Downloads the best audio-only stream with yt-dlp, then demuxes it to MP3
/// with ffmpeg.
pub struct YtDlpFetcher {
    yt_dlp: PathBuf,
    ffmpeg: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    fn download_command(&self, url: &str, video_path: &Path) -> Command {
        let mut cmd = Command::new(&self.yt_dlp);
        cmd.args(["--no-playlist", "--no-progress", "-f", "bestaudio"])
            .args(["--dump-json", "--no-simulate"])
            .arg("-o")
            .arg(video_path)
            .arg("--")
            .arg(url);
        cmd
    }

    fn demux_command(&self, video_path: &Path, audio_path: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(video_path)
            .args(["-vn", "-acodec", "libmp3lame"])
            .arg(audio_path);
        cmd
    }
}

impl Fetcher for YtDlpFetcher {
    fn fetch(&self, url: &str, workspace: &Path) -> Result<FetchedMedia, FetchError> {
        let video_path = workspace.join(VIDEO_FILENAME);
        let audio_path = workspace.join(AUDIO_FILENAME);

        log::info!("Downloading best audio stream of {}", url);
        let output = tools::run(self.download_command(url, &video_path))
            .map_err(FetchError::Download)?;
        let info = MediaInfo::from_stdout(&String::from_utf8_lossy(&output.stdout));
        if let Some(title) = info.as_ref().and_then(|i| i.title.as_deref()) {
            log::info!("Downloaded \"{}\"", title);
        }
        if !video_path.exists() {
            return Err(FetchError::MissingOutput(video_path));
        }

        log::debug!("Extracting audio track to {}", audio_path.display());
        tools::run(self.demux_command(&video_path, &audio_path)).map_err(FetchError::Demux)?;
        if !audio_path.exists() {
            return Err(FetchError::MissingOutput(audio_path));
        }

        Ok(FetchedMedia {
            video_path,
            audio_path,
            info,
        })
    }
}
