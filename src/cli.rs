use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::StrategyKind;
use crate::offset::naming::TrackType;

#[derive(Parser, Debug)]
#[command(
    name = "beatpad",
    version,
    about = "Prepend beat-aligned silence to WAV files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: ./beatpad.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tempo estimation strategy
    #[arg(long, global = true, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pad WAV files with silence and write renamed 24-bit copies
    Pad(PadArgs),
    /// Print the estimated tempo of audio files
    Tempo {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Convert WAV files to MP3 next to the originals
    Mp3 {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// MP3 bitrate passed to the encoder
        #[arg(short, long)]
        bitrate: Option<String>,
    },
    /// Rewrite WAVE_FORMAT_EXTENSIBLE headers to plain PCM in place
    FixHeader {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct PadArgs {
    /// Input WAV files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Tempo, e.g. "128" or "120.00 BPM". Estimated from the audio when omitted.
    #[arg(long)]
    pub bpm: Option<String>,

    /// Number of beats of silence at the beginning
    #[arg(long, default_value = "1", allow_hyphen_values = true)]
    pub beats: String,

    /// Keep the input name with a " - Offseted" suffix instead of the metadata template
    #[arg(long)]
    pub no_rename: bool,

    /// Leave the WAVE_FORMAT_EXTENSIBLE tag written by ffmpeg as is
    #[arg(long)]
    pub no_fix_header: bool,

    /// Also encode each padded file to MP3
    #[arg(long)]
    pub mp3: bool,

    /// Parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[command(flatten)]
    pub metadata: MetadataArgs,
}

/// Fields of the renamed output, `<name> | TYPE key limit bpm depth rate dither | dedication`.
#[derive(Args, Debug, Default)]
pub struct MetadataArgs {
    #[arg(long, value_enum)]
    pub track_type: Option<TrackType>,

    #[arg(long)]
    pub key: Option<String>,

    /// Master limiter ceiling, e.g. "-0.3db"
    #[arg(long, allow_hyphen_values = true)]
    pub limit: Option<String>,

    /// Tempo text for the name (defaults to the resolved tempo)
    #[arg(long)]
    pub bpm_label: Option<String>,

    #[arg(long)]
    pub bit_depth: Option<String>,

    #[arg(long)]
    pub sample_rate_label: Option<String>,

    #[arg(long)]
    pub dither: Option<String>,

    #[arg(long)]
    pub dedicated_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_pad_with_metadata() {
        let cli = Cli::try_parse_from([
            "beatpad", "pad", "a.wav", "b.wav",
            "--bpm", "120.00 BPM",
            "--beats", "-3",
            "--track-type", "master",
            "--limit", "-0.3db",
            "--strategy", "autocorrelation",
        ])
        .unwrap();
        assert_eq!(cli.strategy, Some(StrategyKind::Autocorrelation));
        let Command::Pad(args) = cli.command else {
            panic!("expected pad");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.bpm.as_deref(), Some("120.00 BPM"));
        assert_eq!(args.beats, "-3");
        assert_eq!(args.metadata.track_type, Some(TrackType::Master));
        assert_eq!(args.metadata.limit.as_deref(), Some("-0.3db"));
        assert!(!args.no_rename);
    }

    #[test]
    fn pad_requires_files() {
        assert!(Cli::try_parse_from(["beatpad", "pad"]).is_err());
    }
}
