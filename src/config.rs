use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::offset::naming::TrackType;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Median of inter-onset intervals
    #[default]
    Peaks,
    /// Strongest periodicity of the onset envelope
    Autocorrelation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandKind {
    #[default]
    Bandpass,
    Lowpass,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub band: BandKind,
    #[serde(default = "default_low_hz")]
    pub low_hz: f32,
    #[serde(default = "default_high_hz")]
    pub high_hz: f32,
    #[serde(default = "default_lowpass_hz")]
    pub lowpass_hz: f32,
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
    #[serde(default = "default_true")]
    pub zero_phase: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: f32,
    #[serde(default = "default_compress_ratio")]
    pub compress_ratio: f32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_peak_height_fraction")]
    pub peak_height_fraction: f32,
    #[serde(default = "default_min_peak_spacing_secs")]
    pub min_peak_spacing_secs: f32,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: f32,
    /// Seconds of audio decoded for analysis; 0 means the whole file.
    #[serde(default = "default_max_analysis_secs")]
    pub max_analysis_secs: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_limit")]
    pub limit: String,
    /// Rendered from the resolved tempo when unset.
    #[serde(default)]
    pub bpm_label: Option<String>,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: String,
    #[serde(default = "default_sample_rate_label")]
    pub sample_rate: String,
    #[serde(default = "default_dither")]
    pub dither: String,
    #[serde(default = "default_dedicated_to")]
    pub dedicated_to: String,
    #[serde(default)]
    pub track_type: TrackType,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub rename: bool,
    #[serde(default = "default_true")]
    pub fix_header: bool,
    #[serde(default = "default_mp3_bitrate")]
    pub mp3_bitrate: String,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            band: BandKind::default(),
            low_hz: default_low_hz(),
            high_hz: default_high_hz(),
            lowpass_hz: default_lowpass_hz(),
            filter_order: default_filter_order(),
            zero_phase: true,
            compress: true,
            compress_threshold: default_compress_threshold(),
            compress_ratio: default_compress_ratio(),
            frame_size: default_frame_size(),
            hop_size: default_hop_size(),
            peak_height_fraction: default_peak_height_fraction(),
            min_peak_spacing_secs: default_min_peak_spacing_secs(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            max_analysis_secs: default_max_analysis_secs(),
        }
    }
}

impl AnalysisConfig {
    /// Upper edge of the analysed band, whichever band shape is active.
    pub fn upper_cutoff_hz(&self) -> f32 {
        match self.band {
            BandKind::Bandpass => self.high_hz,
            BandKind::Lowpass => self.lowpass_hz,
        }
    }

    pub fn max_analysis_secs(&self) -> Option<f32> {
        (self.max_analysis_secs > 0.0).then_some(self.max_analysis_secs)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            limit: default_limit(),
            bpm_label: None,
            bit_depth: default_bit_depth(),
            sample_rate: default_sample_rate_label(),
            dither: default_dither(),
            dedicated_to: default_dedicated_to(),
            track_type: TrackType::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rename: true,
            fix_header: true,
            mp3_bitrate: default_mp3_bitrate(),
            jobs: default_jobs(),
        }
    }
}

fn default_true() -> bool { true }
fn default_low_hz() -> f32 { 30.0 }
fn default_high_hz() -> f32 { 160.0 }
fn default_lowpass_hz() -> f32 { 150.0 }
fn default_filter_order() -> usize { 2 }
fn default_compress_threshold() -> f32 { 0.5 }
fn default_compress_ratio() -> f32 { 4.0 }
fn default_frame_size() -> usize { 2048 }
fn default_hop_size() -> usize { 512 }
fn default_peak_height_fraction() -> f32 { 0.3 }
fn default_min_peak_spacing_secs() -> f32 { 0.2 }
fn default_min_bpm() -> f32 { 70.0 }
fn default_max_bpm() -> f32 { 180.0 }
fn default_max_analysis_secs() -> f32 { 60.0 }
fn default_key() -> String { "Cmin".into() }
fn default_limit() -> String { "-0.3db".into() }
fn default_bit_depth() -> String { "24Bits".into() }
fn default_sample_rate_label() -> String { "48Khz".into() }
fn default_dither() -> String { "Triangular".into() }
fn default_dedicated_to() -> String { "LABEL".into() }
fn default_mp3_bitrate() -> String { "320k".into() }
fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path, else `beatpad.toml` in the working directory, else the
/// per-user config file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    lookup_config(
        explicit,
        Path::new("."),
        dirs::home_dir().as_deref(),
        dirs::config_dir().as_deref(),
    )
}

fn lookup_config(
    explicit: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
    config_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let candidates = [
        Some(cwd.join("beatpad.toml")),
        home.map(|h| h.join(".config").join("beatpad").join("config.toml")),
        config_dir.map(|d| d.join("beatpad").join("config.toml")),
    ];
    candidates.into_iter().flatten().find(|path| path.exists())
}
