use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::synth::VideoFormat;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and served/working directories.
    pub server: ServerConfig,
    /// Synthesized video geometry and encoder settings.
    pub render: RenderConfig,
    /// External executables.
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. Defaults to all interfaces.
    pub host: String,
    /// Listening port. The `PORT` environment variable overrides this.
    pub port: u16,
    /// Directory served under `/static/`; final videos are published here.
    pub static_dir: PathBuf,
    /// Parent directory for per-request workspaces.
    pub work_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: PathBuf::from("static"),
            work_dir: PathBuf::from("generated_videos"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_rate: u32,
    /// Thread count handed to the x264 transcode.
    pub transcode_threads: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_width: 160,
            frame_height: 120,
            frame_rate: 30,
            transcode_threads: 4,
        }
    }
}

impl RenderConfig {
    pub fn video_format(&self) -> VideoFormat {
        VideoFormat {
            width: self.frame_width,
            height: self.frame_height,
            frame_rate: self.frame_rate,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Load config from `path`, or from `~/.config/audioflicker/config.toml`
    /// when no path is given. Returns default config if the file doesn't
    /// exist. Logs a warning if the file exists but can't be parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to parse {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!(
                        "Failed to read {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply the `PORT` environment variable on top of the file config.
    pub fn with_env(self) -> Self {
        self.with_port_override(std::env::var("PORT").ok().as_deref())
    }

    /// Override the listening port from a raw string. Unparsable values
    /// are ignored with a warning.
    pub fn with_port_override(mut self, value: Option<&str>) -> Self {
        if let Some(raw) = value {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT value {:?}", raw),
            }
        }
        self
    }

    /// Create the static and working directories if absent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.server.static_dir)?;
        std::fs::create_dir_all(&self.server.work_dir)?;
        Ok(())
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
