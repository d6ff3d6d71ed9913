pub mod decode;
pub mod rms;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Analysis sample rate. Audio is resampled to this before framing.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;
/// Samples per analysis window.
pub const FRAME_LENGTH: usize = 2048;
/// Samples between consecutive analysis frames.
pub const HOP_LENGTH: usize = 512;

#[derive(Error, Debug)]
pub enum EnergyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("no decodable audio track")]
    NoAudioTrack,
    #[error("audio track has no sample rate")]
    UnknownSampleRate,
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Short-time RMS loudness, one value per analysis frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnergyCurve {
    values: Vec<f32>,
    sample_rate: u32,
    hop_length: usize,
}

impl EnergyCurve {
    pub fn new(values: Vec<f32>, sample_rate: u32, hop_length: usize) -> Self {
        debug_assert!(values.iter().all(|v| *v >= 0.0 || v.is_nan()));
        Self {
            values,
            sample_rate,
            hop_length,
        }
    }

    /// A curve framed with the default analysis rate and hop.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self::new(values, ANALYSIS_SAMPLE_RATE, HOP_LENGTH)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Global maximum; 0.0 for an empty curve.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Index of the loudest frame (first one on ties).
    pub fn peak_index(&self) -> Option<usize> {
        let max = self.max();
        self.values.iter().position(|&v| v == max)
    }

    /// Duration of the analyzed audio implied by the frame count.
    pub fn audio_duration_secs(&self) -> f64 {
        (self.values.len() * self.hop_length) as f64 / self.sample_rate as f64
    }
}

/// Turns an audio file into an energy curve.
pub trait EnergyExtractor: Send + Sync {
    fn extract(&self, audio_path: &Path) -> Result<EnergyCurve, EnergyError>;
}

/// Decodes with symphonia and frames at the fixed analysis parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RmsExtractor;

impl EnergyExtractor for RmsExtractor {
    fn extract(&self, audio_path: &Path) -> Result<EnergyCurve, EnergyError> {
        let audio = decode::load_mono(audio_path, ANALYSIS_SAMPLE_RATE)?;
        let values = rms::rms(&audio.samples, FRAME_LENGTH, HOP_LENGTH);
        log::info!(
            "Energy curve: {} frames from {:.1}s of audio",
            values.len(),
            audio.samples.len() as f64 / audio.sample_rate as f64
        );
        Ok(EnergyCurve::new(values, audio.sample_rate, HOP_LENGTH))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a 22.05 kHz mono WAV that is silent except for a half-scale
    /// burst covering exactly the window of analysis frame `peak_frame`.
    pub(crate) fn write_burst_wav(path: &Path, total_frames: usize, peak_frame: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: ANALYSIS_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let center = peak_frame * HOP_LENGTH;
        let burst = center - FRAME_LENGTH / 2..center + FRAME_LENGTH / 2;
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..total_frames * HOP_LENGTH {
            let s: i16 = if burst.contains(&i) { 16384 } else { 0 };
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_curve_stats() {
        let curve = EnergyCurve::from_values(vec![0.1, 0.4, 0.2, 0.4]);
        assert_eq!(curve.len(), 4);
        assert_eq!(curve.max(), 0.4);
        assert_eq!(curve.peak_index(), Some(1));
        let expected = 4.0 * 512.0 / 22_050.0;
        assert!((curve.audio_duration_secs() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_curve() {
        let curve = EnergyCurve::from_values(vec![]);
        assert!(curve.is_empty());
        assert_eq!(curve.max(), 0.0);
        assert_eq!(curve.peak_index(), None);
    }

    #[test]
    fn test_extract_finds_burst() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burst.wav");
        write_burst_wav(&path, 120, 50);

        let curve = RmsExtractor.extract(&path).unwrap();
        assert_eq!(curve.len(), 121);
        assert_eq!(curve.sample_rate(), ANALYSIS_SAMPLE_RATE);
        assert_eq!(curve.peak_index(), Some(50));
        assert!((curve.max() - 0.5).abs() < 1e-4);
        assert_eq!(curve.values()[0], 0.0);
    }

    #[test]
    fn test_resampled_second_has_full_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("44k.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..44_100 {
            writer.write_sample(((i as f32 * 0.03).sin() * 6000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        // 1 + 22050 / 512
        let curve = RmsExtractor.extract(&path).unwrap();
        assert_eq!(curve.len(), 44);
    }

    #[test]
    fn test_serializes_values() {
        let curve = EnergyCurve::from_values(vec![0.0, 0.5]);
        let json = serde_json::to_value(&curve).unwrap();
        assert_eq!(json["values"], serde_json::json!([0.0, 0.5]));
        assert_eq!(json["hop_length"], 512);
    }
}
