use serde::{Deserialize, Serialize};

/// Highest loudness value; matches the DMX byte range.
pub const MAX_LEVEL: u8 = 255;

/// Loudness reading for one analysis window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelFrame {
    /// Mean absolute sample magnitude, in [0, 1].
    pub mean_magnitude: f32,
    /// `mean_magnitude` scaled to [0, 255] and truncated.
    pub level: u8,
}

/// Computes the loudness of a window of samples in [-1, 1].
///
/// The level is the mean absolute magnitude scaled to [0, 255]. Samples
/// outside [-1, 1] are clipped first, so the level never exceeds 255. An
/// empty window is silent.
pub fn measure(samples: &[f32]) -> LevelFrame {
    if samples.is_empty() {
        return LevelFrame::default();
    }

    let sum: f32 = samples
        .iter()
        .map(|sample| if sample.is_nan() { 0.0 } else { sample.abs().min(1.0) })
        .sum();
    let mean_magnitude = (sum / samples.len() as f32).clamp(0.0, 1.0);

    LevelFrame {
        mean_magnitude,
        level: (mean_magnitude * MAX_LEVEL as f32) as u8,
    }
}

/// Converts signed 16-bit PCM into the [-1, 1] range used by [`measure`].
pub fn normalize_i16(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

/// Running statistics over the readings of one audio session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelSummary {
    pub windows: u64,
    pub peak: u8,
    pub last: u8,
}

impl LevelSummary {
    pub fn record(&mut self, frame: &LevelFrame) {
        self.windows += 1;
        self.peak = self.peak.max(frame.level);
        self.last = frame.level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero() {
        assert_eq!(measure(&[0.0; 256]).level, 0);
        assert_eq!(measure(&[]).level, 0);
    }

    #[test]
    fn full_scale_is_max_level() {
        let square: Vec<f32> = (0..512)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert_eq!(measure(&square).level, MAX_LEVEL);
    }

    #[test]
    fn level_is_mean_absolute_magnitude() {
        let frame = measure(&[0.5, -0.5, 0.25, -0.25]);
        assert!((frame.mean_magnitude - 0.375).abs() < 1e-6);
        assert_eq!(frame.level, 95);
    }

    #[test]
    fn clips_out_of_range_samples() {
        assert_eq!(measure(&[4.0, -4.0]).level, MAX_LEVEL);
    }

    #[test]
    fn normalizes_pcm() {
        assert_eq!(normalize_i16(0), 0.0);
        assert_eq!(normalize_i16(i16::MIN), -1.0);
        assert!(normalize_i16(i16::MAX) < 1.0);
    }

    #[test]
    fn summary_tracks_peak() {
        let mut summary = LevelSummary::default();
        summary.record(&LevelFrame {
            mean_magnitude: 0.5,
            level: 127,
        });
        summary.record(&LevelFrame {
            mean_magnitude: 0.1,
            level: 25,
        });
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.peak, 127);
        assert_eq!(summary.last, 25);
    }
}
