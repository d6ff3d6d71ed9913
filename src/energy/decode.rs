use std::fs::File;
use std::io;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::EnergyError;

/// Mono PCM at a known rate.
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode an audio file, mix it down to mono and resample to `target_rate`.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<MonoAudio, EnergyError> {
    let decoded = decode_mono(path)?;
    log::debug!(
        "Decoded {} samples at {} Hz from {}",
        decoded.samples.len(),
        decoded.sample_rate,
        path.display()
    );

    if decoded.sample_rate == target_rate || decoded.samples.is_empty() {
        return Ok(MonoAudio {
            samples: decoded.samples,
            sample_rate: target_rate,
        });
    }

    let samples = resample(decoded.samples, decoded.sample_rate, target_rate)?;
    Ok(MonoAudio {
        samples,
        sample_rate: target_rate,
    })
}

/// Decode every packet of the first audio track, averaging channels.
fn decode_mono(path: &Path) -> Result<MonoAudio, EnergyError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(EnergyError::NoAudioTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                // Chained streams; the first one is all we analyze.
                log::debug!("Stream reset requested, stopping decode");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                mix_into(buf.samples(), spec.channels.count(), &mut samples);
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet: {}", msg);
            }
            Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(MonoAudio {
        samples,
        sample_rate: sample_rate.ok_or(EnergyError::UnknownSampleRate)?,
    })
}

/// Average interleaved frames down to one channel, appending to `out`.
fn mix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Input frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Band-limited resample of a whole signal. The filter delay is trimmed from
/// the front and the tail is flushed, so the output holds exactly
/// `round(len * to / from)` samples aligned with the input.
fn resample(samples: Vec<f32>, from_hz: u32, to_hz: u32) -> Result<Vec<f32>, EnergyError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_hz as f64 / from_hz as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| EnergyError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in chunks.by_ref() {
        let waves = resampler
            .process(&[chunk][..], None)
            .map_err(|e| EnergyError::Resample(e.to_string()))?;
        out.extend_from_slice(&waves[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let waves = resampler
            .process_partial(Some(&[rest][..]), None)
            .map_err(|e| EnergyError::Resample(e.to_string()))?;
        out.extend_from_slice(&waves[0]);
    }

    // Push the delayed tail out of the filter.
    while out.len() < expected + delay {
        let waves = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| EnergyError::Resample(e.to_string()))?;
        if waves[0].is_empty() {
            break;
        }
        out.extend_from_slice(&waves[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}
