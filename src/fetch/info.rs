use serde::{Deserialize, Serialize};

/// The subset of yt-dlp's per-video info document we keep.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Newer extractors fill `channel` instead of `uploader`
    pub channel: Option<String>,
    /// Source duration in seconds, as reported by the site
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
}

impl MediaInfo {
    /// Parse the `--dump-json` output. yt-dlp prints one document per line;
    /// the last non-empty line belongs to the downloaded entry.
    pub fn from_stdout(stdout: &str) -> Option<Self> {
        let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
        match serde_json::from_str(line) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("Could not parse yt-dlp info JSON: {}", e);
                None
            }
        }
    }

    pub fn author(&self) -> Option<&str> {
        self.uploader.as_deref().or(self.channel.as_deref())
    }
}
