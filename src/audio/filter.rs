//! Butterworth high/low-pass sections for band-limiting before onset
//! detection.
//!
//! A filter of order `n` is built as `n / 2` biquads (plus one first-order
//! section when `n` is odd) whose Q values place the poles on the Butterworth
//! circle. Coefficients come from the bilinear transform with pre-warping.

use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassKind {
    LowPass,
    HighPass,
}

#[derive(Clone, Debug)]
struct Section {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Section {
    fn biquad(kind: PassKind, cutoff: f64, sample_rate: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        let (b0, b1, b2) = match kind {
            PassKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            PassKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn first_order(kind: PassKind, cutoff: f64, sample_rate: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        let norm = 1.0 / (1.0 + k);
        let (b0, b1) = match kind {
            PassKind::LowPass => (k * norm, k * norm),
            PassKind::HighPass => (norm, -norm),
        };
        Self {
            b0,
            b1,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    // Transposed direct form II
    fn process(&mut self, input: f64) -> f64 {
        let output = input * self.b0 + self.z1;
        self.z1 = input * self.b1 + self.z2 - self.a1 * output;
        self.z2 = input * self.b2 - self.a2 * output;
        output
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Cascade of sections applied in order.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    sections: Vec<Section>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Butterworth stage. A cutoff outside `(0, nyquist)` adds
    /// nothing, so a misconfigured band degrades to a pass-through instead of
    /// producing an unstable filter.
    pub fn push_butterworth(&mut self, kind: PassKind, order: usize, cutoff_hz: f32, sample_rate: u32) {
        let sr = sample_rate as f64;
        let cutoff = cutoff_hz as f64;
        if !(cutoff > 0.0 && cutoff < sr / 2.0) {
            log::debug!("Skipping {:?} stage: cutoff {}Hz outside (0, {}Hz)", kind, cutoff, sr / 2.0);
            return;
        }

        let order = order.clamp(1, 4);
        for k in 1..=order / 2 {
            let theta = (2 * k - 1) as f64 * PI / (2 * order) as f64;
            let q = 1.0 / (2.0 * theta.sin());
            self.sections.push(Section::biquad(kind, cutoff, sr, q));
        }
        if order % 2 == 1 {
            self.sections.push(Section::first_order(kind, cutoff, sr));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn run(&mut self, samples: &mut [f32]) {
        for section in &mut self.sections {
            section.reset();
            for s in samples.iter_mut() {
                *s = section.process(*s as f64) as f32;
            }
        }
    }

    /// Single forward pass. Introduces the usual IIR group delay.
    pub fn apply(&mut self, samples: &mut [f32]) {
        self.run(samples);
    }

    /// Forward then backward pass: no phase shift, squared magnitude response.
    pub fn apply_zero_phase(&mut self, samples: &mut [f32]) {
        self.run(samples);
        samples.reverse();
        self.run(samples);
        samples.reverse();
    }
}
