use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const OFFSET_SUFFIX: &str = " - Offseted";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackType {
    #[default]
    Demo,
    Master,
    Mix,
    Loop,
    Idea,
    Jam,
    Live,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TrackType::Demo => "DEMO",
            TrackType::Master => "MASTER",
            TrackType::Mix => "MIX",
            TrackType::Loop => "LOOP",
            TrackType::Idea => "IDEA",
            TrackType::Jam => "JAM",
            TrackType::Live => "LIVE",
        };
        f.write_str(tag)
    }
}

/// Mastering details written into the output file name.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackMetadata {
    pub track_type: TrackType,
    pub key: String,
    pub limit: String,
    pub bpm: String,
    pub bit_depth: String,
    pub sample_rate: String,
    pub dither: String,
    pub dedicated_to: String,
}

/// Destination path for a padded copy of `input`.
///
/// Without metadata the base name gets [`OFFSET_SUFFIX`]; with it the name
/// becomes `<base> | TYPE key limit bpm depth rate dither | dedication`. The
/// input's extension is kept (`wav` if it has none).
pub fn output_path(input: &Path, metadata: Option<&TrackMetadata>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wav".to_string());

    let name = match metadata {
        None => format!("{stem}{OFFSET_SUFFIX}.{ext}"),
        Some(m) => format!(
            "{stem} | {} {} {} {} {} {} {} | {}.{ext}",
            m.track_type, m.key, m.limit, m.bpm, m.bit_depth, m.sample_rate, m.dither, m.dedicated_to
        ),
    };
    input.with_file_name(name)
}

/// Sibling path with the `.mp3` extension.
pub fn mp3_path(input: &Path) -> PathBuf {
    input.with_extension("mp3")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> TrackMetadata {
        TrackMetadata {
            track_type: TrackType::Master,
            key: "Cmin".into(),
            limit: "-0.3db".into(),
            bpm: "120.00 BPM".into(),
            bit_depth: "24Bits".into(),
            sample_rate: "48Khz".into(),
            dither: "Triangular".into(),
            dedicated_to: "LABEL".into(),
        }
    }

    #[test]
    fn plain_suffix_without_metadata() {
        let out = output_path(Path::new("/music/My Track.wav"), None);
        assert_eq!(out, PathBuf::from("/music/My Track - Offseted.wav"));
    }

    #[test]
    fn metadata_template() {
        let out = output_path(Path::new("/music/song.wav"), Some(&master()));
        assert_eq!(
            out,
            PathBuf::from("/music/song | MASTER Cmin -0.3db 120.00 BPM 24Bits 48Khz Triangular | LABEL.wav")
        );
    }

    #[test]
    fn keeps_extension_and_inner_dots() {
        let out = output_path(Path::new("take.2.WAV"), None);
        assert_eq!(out, PathBuf::from("take.2 - Offseted.WAV"));
        let out = output_path(Path::new("noext"), None);
        assert_eq!(out, PathBuf::from("noext - Offseted.wav"));
    }

    #[test]
    fn track_type_tags() {
        assert_eq!(TrackType::default().to_string(), "DEMO");
        assert_eq!(TrackType::Live.to_string(), "LIVE");
    }

    #[test]
    fn mp3_sibling() {
        assert_eq!(mp3_path(Path::new("/a/b c.wav")), PathBuf::from("/a/b c.mp3"));
    }
}
