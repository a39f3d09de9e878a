//! Turns decoded audio into a mono, kick-band, peak-normalized signal ready
//! for onset detection.

use super::decode::AudioBuffer;
use super::filter::{FilterChain, PassKind};
use crate::config::{AnalysisConfig, BandKind};

/// Single-channel signal with every sample finite and inside [-1, 1].
#[derive(Clone, Debug)]
pub struct ConditionedSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub fn condition(audio: &AudioBuffer, config: &AnalysisConfig) -> ConditionedSignal {
    let mut samples = downmix(&audio.samples, audio.channels);

    let mut chain = band_filter(config, audio.sample_rate);
    if chain.is_empty() {
        log::debug!("Band filter has no usable stage at {}Hz", audio.sample_rate);
    } else if config.zero_phase {
        chain.apply_zero_phase(&mut samples);
    } else {
        chain.apply(&mut samples);
    }

    if config.compress {
        compress(&mut samples, config.compress_threshold, config.compress_ratio);
    }

    let before = samples.len();
    sanitize(&mut samples);
    if samples.len() != before {
        log::debug!("Dropped {} non-finite samples", before - samples.len());
    }

    normalize_peak(&mut samples);

    ConditionedSignal {
        samples,
        sample_rate: audio.sample_rate,
    }
}

/// Average interleaved channels into one.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn band_filter(config: &AnalysisConfig, sample_rate: u32) -> FilterChain {
    let mut chain = FilterChain::new();
    match config.band {
        BandKind::Bandpass => {
            chain.push_butterworth(PassKind::HighPass, config.filter_order, config.low_hz, sample_rate);
            chain.push_butterworth(PassKind::LowPass, config.filter_order, config.high_hz, sample_rate);
        }
        BandKind::Lowpass => {
            chain.push_butterworth(PassKind::LowPass, config.filter_order, config.lowpass_hz, sample_rate);
        }
    }
    chain
}

/// Power-law gain above `threshold`: the excess over the threshold is
/// raised to `1 / ratio`. Relative to full scale, so the unnormalized signal
/// is compared against the same threshold regardless of its level.
pub fn compress(samples: &mut [f32], threshold: f32, ratio: f32) {
    if !(threshold > 0.0) || !(ratio >= 1.0) {
        return;
    }
    let exponent = 1.0 / ratio;
    for s in samples.iter_mut() {
        let level = s.abs();
        if level > threshold {
            *s = s.signum() * threshold * (level / threshold).powf(exponent);
        }
    }
}

/// Zero out NaN/inf, then drop anything that is somehow still not finite.
pub fn sanitize(samples: &mut Vec<f32>) {
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
    }
    samples.retain(|s| s.is_finite());
}

/// Scale so the loudest sample sits at exactly ±1. A silent buffer is left
/// as is.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    let divisor = if peak > 0.0 { peak } else { 1.0 };
    for s in samples.iter_mut() {
        *s = (*s / divisor).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: Vec<f32>, channels: usize) -> AudioBuffer {
        AudioBuffer {
            samples,
            sample_rate: 44_100,
            channels,
        }
    }

    fn assert_bounded(signal: &ConditionedSignal) {
        for s in &signal.samples {
            assert!(s.is_finite());
            assert!((-1.0..=1.0).contains(s));
        }
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[1.0, 0.0, 0.5, -0.5, -1.0, -1.0], 2);
        assert_eq!(mono, vec![0.5, 0.0, -1.0]);
    }

    #[test]
    fn compress_leaves_quiet_samples() {
        let mut samples = vec![0.25, -0.5, 1.0, -1.0];
        compress(&mut samples, 0.5, 4.0);
        assert_eq!(samples[0], 0.25);
        assert_eq!(samples[1], -0.5);
        let expected = 0.5 * 2.0f32.powf(0.25);
        assert!((samples[2] - expected).abs() < 1e-6);
        assert!((samples[3] + expected).abs() < 1e-6);
    }

    #[test]
    fn compress_ignores_zero_threshold() {
        let mut samples = vec![0.9, -0.9];
        compress(&mut samples, 0.0, 4.0);
        assert_eq!(samples, vec![0.9, -0.9]);
    }

    #[test]
    fn sanitize_zeroes_non_finite() {
        let mut samples = vec![f32::NAN, 0.5, f32::INFINITY, f32::NEG_INFINITY];
        sanitize(&mut samples);
        assert_eq!(samples, vec![0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn normalize_hits_unit_peak() {
        let mut samples = vec![0.1, -0.4, 0.2];
        normalize_peak(&mut samples);
        assert_eq!(samples[1], -1.0);
        assert!((samples[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn all_zero_stays_zero() {
        let signal = condition(&buffer(vec![0.0; 4_096], 2), &AnalysisConfig::default());
        assert_eq!(signal.samples.len(), 2_048);
        assert!(signal.samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn all_nan_is_finite_after_conditioning() {
        let signal = condition(&buffer(vec![f32::NAN; 1_000], 1), &AnalysisConfig::default());
        assert_bounded(&signal);
    }

    #[test]
    fn single_sample_and_empty_buffers() {
        let config = AnalysisConfig::default();
        assert_bounded(&condition(&buffer(vec![0.7], 1), &config));
        assert!(condition(&buffer(vec![], 1), &config).samples.is_empty());
    }

    #[test]
    fn lowpass_keeps_dc_and_bandpass_removes_it() {
        let offset = buffer(vec![0.5; 44_100], 1);
        for zero_phase in [true, false] {
            let lowpass = AnalysisConfig {
                band: BandKind::Lowpass,
                compress: false,
                zero_phase,
                ..AnalysisConfig::default()
            };
            let bandpass = AnalysisConfig {
                band: BandKind::Bandpass,
                ..lowpass.clone()
            };

            let low = condition(&offset, &lowpass);
            let band = condition(&offset, &bandpass);
            assert_bounded(&low);
            assert_bounded(&band);
            assert!(low.samples[22_050] > 0.8, "lowpass mid {}", low.samples[22_050]);
            assert!(band.samples[22_050].abs() < 0.01, "bandpass mid {}", band.samples[22_050]);
        }
    }

    #[test]
    fn loud_bass_is_normalized_to_unit_peak() {
        let samples: Vec<f32> = (0..44_100)
            .map(|i| 3.0 * (2.0 * std::f32::consts::PI * 60.0 * i as f32 / 44_100.0).sin())
            .collect();
        for zero_phase in [true, false] {
            let config = AnalysisConfig {
                zero_phase,
                ..AnalysisConfig::default()
            };
            let signal = condition(&buffer(samples.clone(), 1), &config);
            assert_bounded(&signal);
            let peak = signal.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            assert!((peak - 1.0).abs() < 1e-6);
        }
    }
}
