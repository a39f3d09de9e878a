use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::condition::ConditionedSignal;

/// Per-hop onset strength of a conditioned signal.
#[derive(Clone, Debug)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,
    pub sample_rate: u32,
    pub hop_size: usize,
}

impl OnsetEnvelope {
    /// Frames per second of envelope.
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size as f32
    }

    pub fn frame_time(&self, index: usize) -> f32 {
        index as f32 * self.hop_size as f32 / self.sample_rate as f32
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// Spectral flux restricted to the bins below `max_hz`: for each hop, the
/// median over those bins of the log-magnitude increase since the previous
/// frame. The median keeps a single ringing bin from producing an onset.
pub fn onset_envelope(
    signal: &ConditionedSignal,
    frame_size: usize,
    hop_size: usize,
    max_hz: f32,
) -> OnsetEnvelope {
    let frame_size = frame_size.max(16);
    let hop_size = hop_size.max(1);
    let samples = &signal.samples;

    let mut envelope = OnsetEnvelope {
        values: Vec::new(),
        sample_rate: signal.sample_rate,
        hop_size,
    };
    if samples.len() < frame_size || signal.sample_rate == 0 {
        return envelope;
    }

    let bin_hz = signal.sample_rate as f32 / frame_size as f32;
    let half = frame_size / 2;
    let top_bin = ((max_hz / bin_hz).ceil() as usize).clamp(2, half);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let hann = hann_window(frame_size);

    let num_frames = (samples.len() - frame_size) / hop_size + 1;

    let spectra: Vec<Vec<f32>> = (0..num_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let start = frame_idx * hop_size;
            let mut buffer: Vec<Complex<f32>> = samples[start..start + frame_size]
                .iter()
                .zip(hann.iter())
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            // skip DC
            buffer[1..top_bin].iter().map(|c| c.norm().ln_1p()).collect()
        })
        .collect();

    envelope.values.reserve(num_frames);
    envelope.values.push(0.0);
    let mut rises: Vec<f32> = Vec::with_capacity(top_bin);
    for pair in spectra.windows(2) {
        rises.clear();
        rises.extend(
            pair[1]
                .iter()
                .zip(pair[0].iter())
                .map(|(cur, prev)| (cur - prev).max(0.0)),
        );
        envelope.values.push(median(&mut rises).unwrap_or(0.0));
    }

    log::debug!(
        "Onset envelope: {} frames at {:.1} fps, {} bins up to {:.0}Hz",
        envelope.values.len(),
        envelope.frame_rate(),
        top_bin - 1,
        top_bin as f32 * bin_hz
    );

    envelope
}

/// Median of the finite values; sorts the slice in place.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
