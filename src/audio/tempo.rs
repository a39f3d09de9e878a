//! Tempo estimation from an onset envelope.
//!
//! [`estimate`] never fails: anything that prevents a confident answer
//! (unreadable file, too few onsets, every candidate out of range) yields
//! [`FALLBACK_BPM`].

use anyhow::Result;
use std::path::Path;

use super::condition::condition;
use super::decode::{decode_audio, AudioBuffer};
use super::onset::{median, onset_envelope, OnsetEnvelope};
use crate::config::{AnalysisConfig, StrategyKind};

pub const FALLBACK_BPM: f32 = 120.0;

/// Reduces an onset envelope to one tempo. `None` means inconclusive.
pub trait TempoStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn tempo(&self, envelope: &OnsetEnvelope) -> Option<f32>;
}

pub fn strategy_for(config: &AnalysisConfig) -> Box<dyn TempoStrategy> {
    match config.strategy {
        StrategyKind::Peaks => Box::new(PeakIntervalStrategy::from_config(config)),
        StrategyKind::Autocorrelation => Box::new(AutocorrelationStrategy::from_config(config)),
    }
}

/// Estimate the tempo of an audio file, falling back to 120 BPM.
pub fn estimate(path: &Path, config: &AnalysisConfig) -> f32 {
    match try_estimate(path, config) {
        Ok(Some(bpm)) => {
            log::info!("Estimated tempo of {}: {:.2} BPM", path.display(), bpm);
            bpm
        }
        Ok(None) => {
            log::warn!(
                "Tempo of {} is inconclusive, using {} BPM",
                path.display(),
                FALLBACK_BPM
            );
            FALLBACK_BPM
        }
        Err(e) => {
            log::warn!(
                "Tempo estimation failed for {}: {:#}. Using {} BPM",
                path.display(),
                e,
                FALLBACK_BPM
            );
            FALLBACK_BPM
        }
    }
}

fn try_estimate(path: &Path, config: &AnalysisConfig) -> Result<Option<f32>> {
    let audio = decode_audio(path, config.max_analysis_secs())?;
    Ok(estimate_buffer(&audio, config))
}

/// Condition, build the envelope, and apply the configured strategy.
pub fn estimate_buffer(audio: &AudioBuffer, config: &AnalysisConfig) -> Option<f32> {
    if audio.samples.is_empty() {
        log::debug!("Empty audio buffer");
        return None;
    }
    let signal = condition(audio, config);
    let envelope = onset_envelope(
        &signal,
        config.frame_size,
        config.hop_size,
        2.0 * config.upper_cutoff_hz(),
    );
    let strategy = strategy_for(config);
    let bpm = strategy.tempo(&envelope)?;
    log::debug!("{} strategy: {:.2} BPM", strategy.name(), bpm);
    (bpm.is_finite() && bpm > 0.0).then_some(bpm)
}

/// Local maxima of the envelope, median of the resulting inter-onset tempos.
#[derive(Clone, Debug)]
pub struct PeakIntervalStrategy {
    pub height_fraction: f32,
    pub min_spacing_secs: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl PeakIntervalStrategy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            height_fraction: config.peak_height_fraction,
            min_spacing_secs: config.min_peak_spacing_secs,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
        }
    }
}

impl TempoStrategy for PeakIntervalStrategy {
    fn name(&self) -> &'static str {
        "peaks"
    }

    fn tempo(&self, envelope: &OnsetEnvelope) -> Option<f32> {
        let threshold = self.height_fraction * envelope.mean();
        let distance = (self.min_spacing_secs * envelope.frame_rate()).ceil().max(1.0) as usize;
        let peaks = find_peaks(&envelope.values, threshold, distance);

        if peaks.len() < 2 {
            log::warn!("Only {} onset peak(s) found, cannot derive tempo", peaks.len());
            return None;
        }

        let mut candidates: Vec<f32> = peaks
            .windows(2)
            .map(|w| envelope.frame_time(w[1]) - envelope.frame_time(w[0]))
            .filter(|interval| *interval > 0.0)
            .map(|interval| 60.0 / interval)
            .filter(|bpm| *bpm >= self.min_bpm && *bpm <= self.max_bpm)
            .collect();

        log::debug!(
            "{} peaks, {} tempo candidates in [{}, {}] BPM",
            peaks.len(),
            candidates.len(),
            self.min_bpm,
            self.max_bpm
        );

        if candidates.is_empty() {
            log::warn!("No inter-onset interval falls in the plausible tempo range");
            return None;
        }
        median(&mut candidates)
    }
}

/// Indices of local maxima at least `threshold` high, no two closer than
/// `distance` frames. When two peaks are too close the taller one wins.
pub fn find_peaks(signal: &[f32], threshold: f32, distance: usize) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = (1..signal.len() - 1)
        .filter(|&i| {
            signal[i] > signal[i - 1] && signal[i] >= signal[i + 1] && signal[i] >= threshold
        })
        .collect();

    // tallest first, earlier index breaks ties
    candidates.sort_by(|&a, &b| signal[b].total_cmp(&signal[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for idx in candidates {
        if kept.iter().all(|&k| k.abs_diff(idx) >= distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

/// Lag of strongest self-similarity of the envelope within the tempo range.
#[derive(Clone, Debug)]
pub struct AutocorrelationStrategy {
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl AutocorrelationStrategy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
        }
    }
}

impl TempoStrategy for AutocorrelationStrategy {
    fn name(&self) -> &'static str {
        "autocorrelation"
    }

    fn tempo(&self, envelope: &OnsetEnvelope) -> Option<f32> {
        let fps = envelope.frame_rate();
        if !(self.min_bpm > 0.0 && self.max_bpm > self.min_bpm) || fps <= 0.0 {
            return None;
        }
        let min_lag = ((60.0 * fps / self.max_bpm).floor() as usize).max(1);
        let max_lag = (60.0 * fps / self.min_bpm).ceil() as usize;
        let n = envelope.values.len();
        if max_lag + 1 >= n {
            log::warn!("Envelope of {} frames is too short for autocorrelation", n);
            return None;
        }

        let mean = envelope.mean();
        let centered: Vec<f32> = envelope.values.iter().map(|v| v - mean).collect();
        let energy: f32 = centered.iter().map(|v| v * v).sum();
        if energy <= f32::EPSILON {
            return None;
        }

        // one lag past each end so the peak can be refined
        let acf: Vec<f32> = (min_lag.saturating_sub(1)..=max_lag + 1)
            .map(|lag| {
                centered[..n - lag]
                    .iter()
                    .zip(&centered[lag..])
                    .map(|(a, b)| a * b)
                    .sum::<f32>()
                    / energy
            })
            .collect();
        let offset = min_lag.saturating_sub(1);

        let (best, best_value) = (min_lag..=max_lag)
            .map(|lag| (lag, acf[lag - offset]))
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if best_value <= 0.0 {
            return None;
        }

        let i = best - offset;
        let refined = if i > 0 && i + 1 < acf.len() {
            let (y0, y1, y2) = (acf[i - 1], acf[i], acf[i + 1]);
            let denom = y0 - 2.0 * y1 + y2;
            if denom.abs() > f32::EPSILON {
                best as f32 + (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
            } else {
                best as f32
            }
        } else {
            best as f32
        };

        let bpm = 60.0 * fps / refined;
        (bpm >= self.min_bpm && bpm <= self.max_bpm).then_some(bpm)
    }
}
