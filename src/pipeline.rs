//! One file in, one padded file out: probe, resolve tempo, plan, transcode,
//! patch the header, optionally encode MP3.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audio::tempo;
use crate::config::{AnalysisConfig, MetadataConfig};
use crate::encode::ffmpeg::MediaTool;
use crate::error::{OffsetError, OffsetResult};
use crate::offset::header::normalize_format_tag;
use crate::offset::naming::{mp3_path, output_path, TrackMetadata};
use crate::offset::plan::{build_transcode_spec, parse_beats, parse_bpm, Param, SilencePlan};

#[derive(Clone, Debug)]
pub enum TempoSource {
    /// Free text typed by the user, e.g. "128" or "120.00 BPM".
    Manual(String),
    Estimate,
}

#[derive(Clone, Debug)]
pub struct PadOptions {
    pub tempo: TempoSource,
    pub beats: String,
    /// `None` keeps the plain " - Offseted" name.
    pub naming: Option<MetadataConfig>,
    pub fix_header: bool,
    pub mp3: bool,
}

#[derive(Clone, Debug)]
pub struct PadOutcome {
    pub output: PathBuf,
    pub plan: SilencePlan,
    pub header_patched: bool,
    pub mp3: Option<PathBuf>,
    /// A typed tempo or beat count was unusable and replaced by its default.
    pub defaults_used: bool,
}

/// Output paths taken by jobs of the current batch. Two jobs writing the
/// same file would clobber each other, so the second one is refused.
#[derive(Debug, Default)]
pub struct OutputClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl OutputClaims {
    pub fn claim(&self, path: &Path) -> OffsetResult<()> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(path.to_path_buf()) {
            return Err(OffsetError::OutputClaimed(path.to_path_buf()));
        }
        Ok(())
    }
}

/// Estimation failures already fall back inside the estimator, so only a
/// manual tempo can come back marked as defaulted.
pub fn resolve_tempo(source: &TempoSource, input: &Path, analysis: &AnalysisConfig) -> Param<f32> {
    match source {
        TempoSource::Manual(text) => parse_bpm(text),
        TempoSource::Estimate => Param {
            value: tempo::estimate(input, analysis),
            defaulted: false,
        },
    }
}

/// Label used in the file name for an estimated tempo: "120BPM",
/// "127.5BPM".
pub fn bpm_label(bpm: f32) -> String {
    format!("{}BPM", (bpm * 100.0).round() / 100.0)
}

/// A configured label wins, then the tempo text exactly as the user typed
/// it, then the resolved tempo.
fn name_bpm(naming: &MetadataConfig, source: &TempoSource, bpm: f32) -> String {
    if let Some(label) = &naming.bpm_label {
        return label.clone();
    }
    match source {
        TempoSource::Manual(text) if !text.trim().is_empty() => text.clone(),
        _ => bpm_label(bpm),
    }
}

fn track_metadata(naming: &MetadataConfig, source: &TempoSource, bpm: f32) -> TrackMetadata {
    TrackMetadata {
        track_type: naming.track_type,
        key: naming.key.clone(),
        limit: naming.limit.clone(),
        bpm: name_bpm(naming, source, bpm),
        bit_depth: naming.bit_depth.clone(),
        sample_rate: naming.sample_rate.clone(),
        dither: naming.dither.clone(),
        dedicated_to: naming.dedicated_to.clone(),
    }
}

pub fn pad_file(
    input: &Path,
    options: &PadOptions,
    analysis: &AnalysisConfig,
    tool: &dyn MediaTool,
    claims: &OutputClaims,
) -> OffsetResult<PadOutcome> {
    log::info!("Selected file: {}", input.display());

    let stream = tool.probe(input)?;
    log::debug!("{}: {}Hz, {} ch", input.display(), stream.sample_rate, stream.channels);

    let bpm = resolve_tempo(&options.tempo, input, analysis);
    let beats = parse_beats(&options.beats);
    let plan = SilencePlan::new(bpm.value, beats.value, stream);
    log::debug!("Beat duration {:.4}s", plan.beat_duration_secs);
    log::info!(
        "Silence added to the beginning of the track: {}s ({} beat(s) at {:.2} BPM)",
        plan.duration_arg(),
        plan.beats,
        plan.bpm
    );

    let metadata = options.naming.as_ref().map(|n| track_metadata(n, &options.tempo, plan.bpm));
    let output = output_path(input, metadata.as_ref());
    claims.claim(&output)?;
    if output.exists() {
        log::warn!("{} already exists and will be overwritten", output.display());
    }

    let spec = build_transcode_spec(&plan, input, &output);
    tool.transcode(&spec)?;
    log::info!("Output file saved as: {}", output.display());

    let header_patched = if options.fix_header {
        normalize_format_tag(&output)?
    } else {
        false
    };

    let mp3 = if options.mp3 {
        Some(convert_mp3(&output, tool)?)
    } else {
        None
    };

    Ok(PadOutcome {
        output,
        plan,
        header_patched,
        mp3,
        defaults_used: bpm.defaulted || beats.defaulted,
    })
}

/// Encode `input` to a same-named `.mp3` next to it.
pub fn convert_mp3(input: &Path, tool: &dyn MediaTool) -> OffsetResult<PathBuf> {
    let output = mp3_path(input);
    if output.exists() {
        log::warn!("{} already exists and will be overwritten", output.display());
    }
    tool.encode_mp3(input, &output)?;
    Ok(output)
}
