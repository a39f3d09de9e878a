use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{OffsetError, OffsetResult};
use crate::offset::plan::{StreamParams, TranscodeSpec};

/// The external programs the pipeline relies on.
pub trait MediaTool: Send + Sync {
    fn probe(&self, input: &Path) -> OffsetResult<StreamParams>;

    /// Run a pad-and-reencode job. Returns the tool's diagnostic output.
    fn transcode(&self, spec: &TranscodeSpec) -> OffsetResult<String>;

    fn encode_mp3(&self, input: &Path, output: &Path) -> OffsetResult<String>;
}

/// `ffmpeg`/`ffprobe` found on `PATH`.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    pub mp3_bitrate: String,
}

impl Ffmpeg {
    pub fn new(mp3_bitrate: &str) -> Self {
        Self {
            mp3_bitrate: mp3_bitrate.to_string(),
        }
    }

    /// Both binaries must answer `-version`.
    pub fn check_installed() -> OffsetResult<()> {
        for tool in ["ffmpeg", "ffprobe"] {
            let ok = Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|status| status.success());
            if !ok {
                return Err(OffsetError::ToolMissing { tool });
            }
        }
        Ok(())
    }
}

impl MediaTool for Ffmpeg {
    fn probe(&self, input: &Path) -> OffsetResult<StreamParams> {
        let output = Command::new("ffprobe")
            .args(probe_args(input))
            .stdin(Stdio::null())
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout).map_err(|reason| OffsetError::Probe {
            path: input.to_path_buf(),
            reason: if output.status.success() {
                reason
            } else {
                String::from_utf8_lossy(&output.stderr).trim().to_string()
            },
        })
    }

    fn transcode(&self, spec: &TranscodeSpec) -> OffsetResult<String> {
        log::info!(
            "Padding {} with {}s of silence ({}Hz, {} ch)",
            spec.input.display(),
            spec.silence_secs,
            spec.stream.sample_rate,
            spec.stream.channels
        );
        run_ffmpeg(&transcode_args(spec))
    }

    fn encode_mp3(&self, input: &Path, output: &Path) -> OffsetResult<String> {
        log::info!("Encoding {} at {}", output.display(), self.mp3_bitrate);
        run_ffmpeg(&mp3_args(input, output, &self.mp3_bitrate))
    }
}

fn run_ffmpeg(args: &[String]) -> OffsetResult<String> {
    log::debug!("ffmpeg {}", args.join(" "));
    let output: Output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .output()?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(OffsetError::Transcode {
            status: output.status.to_string(),
            stderr,
        });
    }
    log::debug!("ffmpeg output:\n{}", stderr);
    Ok(stderr)
}

pub fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(), "error".into(),
        "-select_streams".into(), "a:0".into(),
        "-show_entries".into(), "stream=sample_rate,channels".into(),
        "-of".into(), "json".into(),
        input.to_string_lossy().into_owned(),
    ]
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    sample_rate: Option<serde_json::Value>,
    #[serde(default)]
    channels: Option<serde_json::Value>,
}

/// ffprobe reports `sample_rate` as a string and `channels` as a number;
/// either form is accepted for both.
pub fn parse_probe_output(stdout: &str) -> Result<StreamParams, String> {
    let parsed: ProbeOutput =
        serde_json::from_str(stdout).map_err(|e| format!("unreadable ffprobe output: {}", e))?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| "no audio stream".to_string())?;

    let sample_rate = positive(stream.sample_rate.as_ref()).ok_or("missing sample rate")?;
    let channels = positive(stream.channels.as_ref()).ok_or("missing channel count")?;

    Ok(StreamParams {
        sample_rate: u32::try_from(sample_rate).map_err(|_| "sample rate out of range")?,
        channels: u16::try_from(channels).map_err(|_| "channel count out of range")?,
    })
}

fn positive(value: Option<&serde_json::Value>) -> Option<u64> {
    let n = match value? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (n > 0).then_some(n)
}

/// `anullsrc` channel layout for a channel count. A bare count makes ffmpeg
/// pick its default layout for that many channels (6 is 5.1).
pub fn channel_layout(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => n.to_string(),
    }
}

pub fn transcode_args(spec: &TranscodeSpec) -> Vec<String> {
    let rate = spec.stream.sample_rate.to_string();
    let channels = spec.stream.channels.to_string();
    vec![
        "-y".into(),
        "-f".into(), "lavfi".into(),
        "-t".into(), spec.silence_secs.clone(),
        "-i".into(), format!("anullsrc=r={}:cl={}", rate, channel_layout(spec.stream.channels)),
        "-i".into(), spec.input.to_string_lossy().into_owned(),
        "-filter_complex".into(), "[0][1]concat=n=2:v=0:a=1[out]".into(),
        "-map".into(), "[out]".into(),
        "-ar".into(), rate,
        "-ac".into(), channels,
        "-c:a".into(), "pcm_s24le".into(),
        spec.output.to_string_lossy().into_owned(),
    ]
}

pub fn mp3_args(input: &Path, output: &Path, bitrate: &str) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(), input.to_string_lossy().into_owned(),
        "-codec:a".into(), "libmp3lame".into(),
        "-b:a".into(), bitrate.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::plan::{build_transcode_spec, SilencePlan};

    #[test]
    fn parses_ffprobe_json() {
        let out = r#"{ "programs": [], "streams": [ { "sample_rate": "44100", "channels": 2 } ] }"#;
        assert_eq!(
            parse_probe_output(out).unwrap(),
            StreamParams {
                sample_rate: 44_100,
                channels: 2
            }
        );
    }

    #[test]
    fn probe_failures() {
        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output(r#"{"streams": []}"#).is_err());
        assert!(parse_probe_output(r#"{"streams": [{"sample_rate": "", "channels": 2}]}"#).is_err());
        assert!(parse_probe_output(r#"{"streams": [{"sample_rate": "48000"}]}"#).is_err());
        assert!(parse_probe_output(r#"{"streams": [{"sample_rate": "48000", "channels": 0}]}"#).is_err());
    }

    #[test]
    fn transcode_command_for_128_bpm_two_beats() {
        let stream = StreamParams {
            sample_rate: 44_100,
            channels: 2,
        };
        let plan = SilencePlan::new(128.0, 2.0, stream);
        let spec = build_transcode_spec(&plan, Path::new("/in/song.wav"), Path::new("/out/song.wav"));
        let args = transcode_args(&spec);
        let expected: Vec<String> = [
            "-y", "-f", "lavfi", "-t", "0.9375",
            "-i", "anullsrc=r=44100:cl=stereo",
            "-i", "/in/song.wav",
            "-filter_complex", "[0][1]concat=n=2:v=0:a=1[out]",
            "-map", "[out]",
            "-ar", "44100", "-ac", "2",
            "-c:a", "pcm_s24le",
            "/out/song.wav",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn surround_silence_uses_default_layout() {
        let stream = StreamParams {
            sample_rate: 48_000,
            channels: 6,
        };
        let plan = SilencePlan::new(120.0, 1.0, stream);
        let args = transcode_args(&build_transcode_spec(&plan, Path::new("in.wav"), Path::new("out.wav")));
        assert!(args.contains(&"anullsrc=r=48000:cl=6".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-ac" && w[1] == "6"));
    }

    #[test]
    fn layouts_follow_channel_count() {
        assert_eq!(channel_layout(1), "mono");
        assert_eq!(channel_layout(2), "stereo");
        assert_eq!(channel_layout(6), "6");
        assert_eq!(channel_layout(8), "8");
    }

    #[test]
    fn mp3_command() {
        let args = mp3_args(Path::new("a.wav"), Path::new("a.mp3"), "320k");
        assert_eq!(args, vec!["-y", "-i", "a.wav", "-codec:a", "libmp3lame", "-b:a", "320k", "a.mp3"]);
    }
}
