//! Silence duration arithmetic and the description of the pad-and-reencode
//! job handed to the transcoder.

use std::path::{Path, PathBuf};

use crate::audio::tempo::FALLBACK_BPM;

pub const DEFAULT_BEATS: f64 = 1.0;

/// A user-supplied parameter after validation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Param<T> {
    pub value: T,
    /// True when the input was unusable and the default was substituted.
    pub defaulted: bool,
}

impl<T> Param<T> {
    fn given(value: T) -> Self {
        Self { value, defaulted: false }
    }

    fn fallback(value: T) -> Self {
        Self { value, defaulted: true }
    }
}

/// Parse a tempo field such as `"128"`, `"120.00 BPM"` or `"bpm 95.5"`.
///
/// The first decimal number in the text is used; no number, or a value that
/// is not strictly positive, resolves to 120 BPM.
pub fn parse_bpm(text: &str) -> Param<f32> {
    match first_number(text).and_then(|n| n.parse::<f32>().ok()) {
        Some(bpm) if bpm.is_finite() && bpm > 0.0 => Param::given(bpm),
        _ => {
            log::warn!("Invalid BPM value {:?}. Defaulting to {} BPM.", text, FALLBACK_BPM);
            Param::fallback(FALLBACK_BPM)
        }
    }
}

/// Parse a beat count; non-numeric or non-positive input becomes one beat.
pub fn parse_beats(text: &str) -> Param<f64> {
    match text.trim().parse::<f64>() {
        Ok(beats) if beats.is_finite() && beats > 0.0 => Param::given(beats),
        _ => {
            log::warn!("Invalid number of beats {:?}. Defaulting to {} beat.", text, DEFAULT_BEATS);
            Param::fallback(DEFAULT_BEATS)
        }
    }
}

fn first_number(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().enumerate().position(|(i, b)| {
        b.is_ascii_digit() || (*b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    })?;
    let start = if start > 0 && bytes[start - 1] == b'-' { start - 1 } else { start };

    let mut end = start + 1;
    let mut seen_dot = bytes[start] == b'.';
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    Some(&text[start..end])
}

/// Sample rate and channel count of the first audio stream of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SilencePlan {
    pub bpm: f32,
    pub beats: f64,
    pub beat_duration_secs: f64,
    pub silence_secs: f64,
    pub stream: StreamParams,
}

impl SilencePlan {
    /// Invalid tempo or beat values are replaced by their defaults so the
    /// duration is always positive.
    pub fn new(bpm: f32, beats: f64, stream: StreamParams) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 {
            bpm
        } else {
            log::warn!("Tempo {} is not usable, planning with {} BPM", bpm, FALLBACK_BPM);
            FALLBACK_BPM
        };
        let beats = if beats.is_finite() && beats > 0.0 {
            beats
        } else {
            log::warn!("Beat count {} is not usable, planning with {} beat", beats, DEFAULT_BEATS);
            DEFAULT_BEATS
        };
        let beat_duration_secs = 60.0 / bpm as f64;
        Self {
            bpm,
            beats,
            beat_duration_secs,
            silence_secs: beat_duration_secs * beats,
            stream,
        }
    }

    /// Duration as passed on the command line, fixed at four decimals.
    pub fn duration_arg(&self) -> String {
        format!("{:.4}", self.silence_secs)
    }
}

/// Generate `silence_secs` of silence matching the source stream, put it in
/// front of `input`, write `output` as 24-bit PCM with the same layout.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscodeSpec {
    pub silence_secs: String,
    pub stream: StreamParams,
    pub input: PathBuf,
    pub output: PathBuf,
}

pub fn build_transcode_spec(plan: &SilencePlan, input: &Path, output: &Path) -> TranscodeSpec {
    TranscodeSpec {
        silence_secs: plan.duration_arg(),
        stream: plan.stream,
        input: input.to_path_buf(),
        output: output.to_path_buf(),
    }
}
