/// Frame-wise RMS energy over centered frames.
///
/// The signal is treated as zero-padded by `frame_length / 2` on both sides,
/// so frame `t` is centered on sample `t * hop_length` and there are
/// `1 + samples.len() / hop_length` frames. Padding contributes zero energy
/// but still counts toward the frame length.
pub fn rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    assert!(frame_length > 0 && hop_length > 0, "frame and hop must be non-zero");

    let pad = frame_length / 2;
    let n_frames = 1 + samples.len() / hop_length;

    (0..n_frames)
        .map(|t| {
            // Window in padded coordinates is [t*hop, t*hop + frame_length).
            let start = t * hop_length;
            let lo = start.saturating_sub(pad).min(samples.len());
            let hi = (start + frame_length - pad).min(samples.len());
            let power: f64 = samples[lo..hi.max(lo)]
                .iter()
                .map(|&x| (x as f64) * (x as f64))
                .sum();
            (power / frame_length as f64).sqrt() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count() {
        assert_eq!(rms(&[], 2048, 512).len(), 1);
        assert_eq!(rms(&vec![0.0; 511], 2048, 512).len(), 1);
        assert_eq!(rms(&vec![0.0; 512], 2048, 512).len(), 2);
        assert_eq!(rms(&vec![0.0; 22_050], 2048, 512).len(), 44);
    }

    #[test]
    fn test_constant_signal() {
        let samples = vec![1.0f32; 8192];
        let curve = rms(&samples, 2048, 512);

        // First frame only sees the right half of its window.
        assert!((curve[0] - 0.5f32.sqrt()).abs() < 1e-6);
        // Fully covered frames are exactly 1.
        for &v in &curve[2..curve.len() - 2] {
            assert!((v - 1.0).abs() < 1e-6);
        }
        // Last frame (centered on sample 8192) sees the left half.
        assert!((curve[curve.len() - 1] - 0.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_silence_is_zero() {
        let curve = rms(&vec![0.0; 4096], 2048, 512);
        assert!(curve.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sign_does_not_matter() {
        let pos = rms(&vec![0.3; 3000], 1024, 256);
        let neg = rms(&vec![-0.3; 3000], 1024, 256);
        assert_eq!(pos, neg);
    }

    #[test]
    fn test_burst_peaks_at_its_center_frame() {
        let mut samples = vec![0.0f32; 60 * 512];
        // Exactly the window of frame 40.
        for s in &mut samples[40 * 512 - 1024..40 * 512 + 1024] {
            *s = 0.5;
        }
        let curve = rms(&samples, 2048, 512);
        let peak = curve
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(40));
        assert!((curve[40] - 0.5).abs() < 1e-6);
        assert!(curve[39] < curve[40] && curve[41] < curve[40]);
    }
}
