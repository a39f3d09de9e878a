use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Interleaved samples as they come out of the decoder.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Decode the first audio track of `path`.
///
/// With `max_secs` set, decoding stops once that much audio has been read;
/// tempo analysis only ever looks at the opening of a track.
pub fn decode_audio(path: &Path, max_secs: Option<f32>) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    if sample_rate == 0 {
        anyhow::bail!("Track reports a sample rate of 0");
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let sample_limit = max_secs
        .filter(|s| *s > 0.0)
        .map(|s| ((s * sample_rate as f32) as usize).saturating_mul(channels));

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        if sample_limit.is_some_and(|limit| all_samples.len() >= limit) {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        all_samples.extend_from_slice(sample_buf.samples());
    }

    if let Some(limit) = sample_limit {
        all_samples.truncate(limit);
    }

    let buffer = AudioBuffer {
        samples: all_samples,
        sample_rate,
        channels,
    };

    log::info!(
        "Decoded audio: {} frames, {}Hz, {} ch, {:.1}s",
        buffer.frames(),
        sample_rate,
        channels,
        buffer.duration_secs()
    );

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    fn write_stereo(path: &Path, secs: f32) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..(secs * 22_050.0) as usize {
            writer.write_sample(8_000i16).unwrap();
            writer.write_sample(-8_000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_interleaved_stereo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo(&path, 1.0);

        let audio = decode_audio(&path, None).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frames(), 22_050);
        assert!(audio.samples[0] > 0.2);
        assert!(audio.samples[1] < -0.2);
    }

    #[test]
    fn stops_at_max_secs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_stereo(&path, 3.0);

        let audio = decode_audio(&path, Some(1.0)).unwrap();
        assert_eq!(audio.frames(), 22_050);
    }

    #[test]
    fn huge_limit_reads_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_stereo(&path, 0.5);

        let audio = decode_audio(&path, Some(f32::MAX)).unwrap();
        assert_eq!(audio.frames(), 11_025);
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a riff file").unwrap();
        assert!(decode_audio(&path, None).is_err());
    }
}
