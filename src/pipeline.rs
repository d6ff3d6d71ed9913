//! The four-stage render: fetch → analyze → synthesize/encode → transcode.
//!
//! Each request gets its own workspace directory under the configured work
//! directory, named after a fresh request id. Intermediates (`video.mp4`,
//! `audio.mp3`, `motion_video.mp4`) live there and are removed when the
//! request finishes, successful or not. Only the final video is published
//! to the output directory, as `real_video_<id>.mp4`.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::energy::{EnergyError, EnergyExtractor, RmsExtractor};
use crate::fetch::{FetchError, Fetcher, YtDlpFetcher};
use crate::synth::{self, EncodeError, FfmpegFrameEncoder, FrameEncoder, SynthError, VideoFormat};
use crate::transcode::{TranscodeError, Transcoder, X264Transcoder};

pub const MOTION_VIDEO_FILENAME: &str = "motion_video.mp4";
pub const OUTPUT_PREFIX: &str = "real_video_";

/// Reported and analyzed durations further apart than this are logged.
const DURATION_TOLERANCE_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Analyze,
    Synthesize,
    Encode,
    Transcode,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch => "downloading audio",
            Self::Analyze => "measuring loudness",
            Self::Synthesize => "building frames",
            Self::Encode => "encoding motion video",
            Self::Transcode => "transcoding to H.264",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not prepare request workspace: {0}")]
    Workspace(#[source] io::Error),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("energy extraction failed: {0}")]
    Energy(#[from] EnergyError),
    #[error("frame synthesis failed: {0}")]
    Synth(#[from] SynthError),
    #[error("motion video encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
}

impl PipelineError {
    /// The stage that failed, if the failure happened inside one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Workspace(_) => None,
            Self::Fetch(_) => Some(Stage::Fetch),
            Self::Energy(_) => Some(Stage::Analyze),
            Self::Synth(_) => Some(Stage::Synthesize),
            Self::Encode(_) => Some(Stage::Encode),
            Self::Transcode(_) => Some(Stage::Transcode),
        }
    }
}

/// What a finished render produced.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub request_id: Uuid,
    pub output_path: PathBuf,
    /// File name inside the output directory.
    pub file_name: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Duration the site reports for the source video.
    pub source_duration_secs: Option<f64>,
    pub energy_frames: usize,
    pub video_frames: usize,
    pub video_duration_secs: f64,
    /// Duration of the analyzed audio. Differs from `video_duration_secs`.
    pub audio_duration_secs: f64,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl RenderOutcome {
    /// Path the HTTP server serves the output under.
    pub fn video_url(&self) -> String {
        format!("/static/{}", self.file_name)
    }
}

pub struct Pipeline {
    fetcher: Box<dyn Fetcher>,
    extractor: Box<dyn EnergyExtractor>,
    encoder: Box<dyn FrameEncoder>,
    transcoder: Box<dyn Transcoder>,
    format: VideoFormat,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        fetcher: Box<dyn Fetcher>,
        extractor: Box<dyn EnergyExtractor>,
        encoder: Box<dyn FrameEncoder>,
        transcoder: Box<dyn Transcoder>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            encoder,
            transcoder,
            format: VideoFormat::default(),
            work_dir: PathBuf::from("generated_videos"),
            output_dir: PathBuf::from("static"),
        }
    }

    /// The production pipeline: yt-dlp, symphonia RMS, ffmpeg mp4v, ffmpeg x264.
    pub fn from_config(config: &AppConfig) -> Self {
        let tools = &config.tools;
        Self::new(
            Box::new(YtDlpFetcher::new(&tools.yt_dlp, &tools.ffmpeg)),
            Box::new(RmsExtractor),
            Box::new(FfmpegFrameEncoder::new(&tools.ffmpeg)),
            Box::new(X264Transcoder::new(
                &tools.ffmpeg,
                config.render.transcode_threads,
            )),
        )
        .with_format(config.render.video_format())
        .with_dirs(&config.server.work_dir, &config.server.static_dir)
    }

    pub fn with_format(mut self, format: VideoFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_dirs(mut self, work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self.output_dir = output_dir.into();
        self
    }

    pub fn run(&self, url: &str) -> Result<RenderOutcome, PipelineError> {
        self.run_with_progress(url, |_| {})
    }

    /// Run all stages for `url`, calling `on_stage` as each one starts.
    pub fn run_with_progress(
        &self,
        url: &str,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<RenderOutcome, PipelineError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();

        std::fs::create_dir_all(&self.work_dir).map_err(PipelineError::Workspace)?;
        std::fs::create_dir_all(&self.output_dir).map_err(PipelineError::Workspace)?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("request-{}-", request_id))
            .tempdir_in(&self.work_dir)
            .map_err(PipelineError::Workspace)?;
        log::info!(
            "[{}] Rendering {} in {}",
            request_id,
            url,
            workspace.path().display()
        );

        on_stage(Stage::Fetch);
        let media = self.fetcher.fetch(url, workspace.path())?;

        on_stage(Stage::Analyze);
        let curve = self.extractor.extract(&media.audio_path)?;

        on_stage(Stage::Synthesize);
        let frames = synth::synthesize(&curve, &self.format)?;

        on_stage(Stage::Encode);
        let motion_path = workspace.path().join(MOTION_VIDEO_FILENAME);
        self.encoder.encode(&frames, &self.format, &motion_path)?;

        on_stage(Stage::Transcode);
        let file_name = format!("{}{}.mp4", OUTPUT_PREFIX, request_id);
        let output_path = self.output_dir.join(&file_name);
        if let Err(e) = self.transcoder.transcode(&motion_path, &output_path) {
            std::fs::remove_file(&output_path).ok();
            return Err(e.into());
        }

        let video_duration_secs = self.format.duration_secs(frames.len());
        let audio_duration_secs = curve.audio_duration_secs();
        let info = media.info.unwrap_or_default();
        if let Some(reported) = info.duration {
            if (reported - audio_duration_secs).abs() > DURATION_TOLERANCE_SECS {
                log::warn!(
                    "[{}] Source reports {:.2}s but {:.2}s of audio was analyzed",
                    request_id,
                    reported,
                    audio_duration_secs
                );
            }
        }
        let elapsed = started.elapsed();
        log::info!(
            "[{}] Done in {:.2}s: {} frames, {:.2}s of video for {:.2}s of audio",
            request_id,
            elapsed.as_secs_f64(),
            frames.len(),
            video_duration_secs,
            audio_duration_secs
        );

        Ok(RenderOutcome {
            request_id,
            output_path,
            file_name,
            uploader: info.author().map(str::to_owned),
            title: info.title,
            source_duration_secs: info.duration,
            energy_frames: curve.len(),
            video_frames: frames.len(),
            video_duration_secs,
            audio_duration_secs,
            elapsed_secs: elapsed.as_secs_f64(),
            finished_at: Utc::now(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::energy::{EnergyCurve, RmsExtractor};
    use std::path::Path;

    fn pipeline_in(
        root: &Path,
        fetcher: FakeFetcher,
        extractor: Box<dyn EnergyExtractor>,
        encoder: RecordingEncoder,
        transcoder: CopyTranscoder,
    ) -> Pipeline {
        Pipeline::new(
            Box::new(fetcher),
            extractor,
            Box::new(encoder),
            Box::new(transcoder),
        )
        .with_dirs(root.join("work"), root.join("static"))
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_run_publishes_output_and_cleans_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default();
        let encoder = RecordingEncoder::default();
        let mut values = vec![0.1f32; 95];
        values[50] = 0.5;
        let pipeline = pipeline_in(
            dir.path(),
            fetcher.clone(),
            Box::new(FixedExtractor(EnergyCurve::from_values(values))),
            encoder.clone(),
            CopyTranscoder::default(),
        );

        let mut stages = Vec::new();
        let outcome = pipeline
            .run_with_progress("https://example.com/v", |s| stages.push(s))
            .unwrap();

        assert_eq!(
            stages,
            vec![
                Stage::Fetch,
                Stage::Analyze,
                Stage::Synthesize,
                Stage::Encode,
                Stage::Transcode
            ]
        );
        assert_eq!(outcome.energy_frames, 95);
        assert_eq!(outcome.video_frames, 10);
        assert_eq!(outcome.title.as_deref(), Some("Test Clip"));
        assert_eq!(outcome.uploader.as_deref(), Some("Test Channel"));
        assert_eq!(outcome.source_duration_secs, Some(12.5));
        assert!(outcome.file_name.starts_with(OUTPUT_PREFIX));
        assert_eq!(outcome.video_url(), format!("/static/{}", outcome.file_name));
        assert_eq!(std::fs::read(&outcome.output_path).unwrap(), b"motion");

        let frames = encoder.frames.lock().unwrap();
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[5].color, [255, 0, 255]);

        // Workspace was created under work/ and is gone now.
        let workspaces = fetcher.workspaces.lock().unwrap();
        assert_eq!(workspaces.len(), 1);
        assert!(workspaces[0].starts_with(dir.path().join("work")));
        assert!(!workspaces[0].exists());
        assert_eq!(entries(&dir.path().join("work")), 0);
    }

    #[test]
    fn test_requests_get_distinct_workspaces_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default();
        let pipeline = pipeline_in(
            dir.path(),
            fetcher.clone(),
            Box::new(FixedExtractor(EnergyCurve::from_values(vec![1.0; 30]))),
            RecordingEncoder::default(),
            CopyTranscoder::default(),
        );

        let a = pipeline.run("https://example.com/a").unwrap();
        let b = pipeline.run("https://example.com/b").unwrap();
        assert_ne!(a.request_id, b.request_id);
        assert_ne!(a.output_path, b.output_path);
        assert!(a.output_path.exists() && b.output_path.exists());

        let workspaces = fetcher.workspaces.lock().unwrap();
        assert_ne!(workspaces[0], workspaces[1]);
    }

    #[test]
    fn test_silent_audio_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(
            dir.path(),
            FakeFetcher::default(),
            Box::new(FixedExtractor(EnergyCurve::from_values(vec![0.0; 50]))),
            RecordingEncoder::default(),
            CopyTranscoder::default(),
        );

        let err = pipeline.run("https://example.com/silence").unwrap_err();
        assert!(matches!(err, PipelineError::Synth(SynthError::SilentCurve(_))));
        assert_eq!(err.stage(), Some(Stage::Synthesize));
        assert_eq!(entries(&dir.path().join("static")), 0);
        assert_eq!(entries(&dir.path().join("work")), 0);
    }

    #[test]
    fn test_fetch_failure_stops_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = RecordingEncoder::default();
        let pipeline = pipeline_in(
            dir.path(),
            FakeFetcher {
                fail: true,
                ..FakeFetcher::default()
            },
            Box::new(FixedExtractor(EnergyCurve::from_values(vec![1.0]))),
            encoder.clone(),
            CopyTranscoder::default(),
        );

        let err = pipeline.run("not a url").unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Fetch));
        assert!(err.to_string().contains("Unsupported URL"));
        assert!(encoder.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_transcode_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(
            dir.path(),
            FakeFetcher::default(),
            Box::new(FixedExtractor(EnergyCurve::from_values(vec![1.0; 12]))),
            RecordingEncoder::default(),
            CopyTranscoder { fail: true },
        );

        let err = pipeline.run("https://example.com/v").unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Transcode));
        assert_eq!(entries(&dir.path().join("static")), 0);
    }

    #[test]
    fn test_video_duration_decoupled_from_audio() {
        let dir = tempfile::tempdir().unwrap();
        // 300 analysis frames ≈ 6.97 s of audio
        let pipeline = pipeline_in(
            dir.path(),
            FakeFetcher::default(),
            Box::new(FixedExtractor(EnergyCurve::from_values(vec![0.2; 300]))),
            RecordingEncoder::default(),
            CopyTranscoder::default(),
        );

        let outcome = pipeline.run("https://example.com/v").unwrap();
        assert_eq!(outcome.video_frames, 30);
        assert!((outcome.video_duration_secs - 1.0).abs() < 1e-12);
        assert!((outcome.audio_duration_secs - 300.0 * 512.0 / 22_050.0).abs() < 1e-9);
        assert!(outcome.audio_duration_secs > 6.0 * outcome.video_duration_secs);
    }

    #[test]
    fn test_end_to_end_peak_frame_is_magenta() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        crate::energy::tests::write_burst_wav(&wav, 120, 50);

        let encoder = RecordingEncoder::default();
        let pipeline = pipeline_in(
            dir.path(),
            FakeFetcher {
                audio_source: Some(wav),
                ..FakeFetcher::default()
            },
            Box::new(RmsExtractor),
            encoder.clone(),
            CopyTranscoder::default(),
        );

        let outcome = pipeline.run("https://example.com/clip").unwrap();
        assert_eq!(outcome.energy_frames, 121);
        assert_eq!(outcome.video_frames, 13);

        let frames = encoder.frames.lock().unwrap();
        assert_eq!(frames[5].color, [255, 0, 255]);
        assert_eq!(frames[0].color, [0, 255, 0]);
        assert!(frames.iter().all(|f| (f.width, f.height) == (160, 120)));
    }
}
