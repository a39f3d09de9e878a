//! In-place fix of the WAV format tag.
//!
//! ffmpeg writes 24-bit PCM with `WAVE_FORMAT_EXTENSIBLE` (0xFFFE) in the
//! `fmt ` chunk. Some CDJ firmware refuses those files (Pioneer E-8305), so
//! the tag is rewritten to plain `WAVE_FORMAT_PCM`. Nothing else in the file
//! is touched.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{OffsetError, OffsetResult};

pub const FORMAT_TAG_OFFSET: u64 = 20;
pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Rewrite the format tag if it reads 0xFFFE. Returns whether the file
/// changed. Files too short to have a tag are left alone.
pub fn normalize_format_tag(path: &Path) -> OffsetResult<bool> {
    let patch_err = |source| OffsetError::HeaderPatch {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(patch_err)?;

    file.seek(SeekFrom::Start(FORMAT_TAG_OFFSET)).map_err(patch_err)?;
    let mut tag = [0u8; 2];
    match file.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            log::debug!("{} is too short to carry a format tag", path.display());
            return Ok(false);
        }
        Err(e) => return Err(patch_err(e)),
    }

    let format_tag = u16::from_le_bytes(tag);
    if format_tag != WAVE_FORMAT_EXTENSIBLE {
        log::debug!("Format tag of {} is {:#06x}, leaving it", path.display(), format_tag);
        return Ok(false);
    }

    log::info!("Fixing WAV format tag for: {}", path.display());
    file.seek(SeekFrom::Start(FORMAT_TAG_OFFSET)).map_err(patch_err)?;
    file.write_all(&WAVE_FORMAT_PCM.to_le_bytes()).map_err(patch_err)?;
    file.flush().map_err(patch_err)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 44-byte canonical header plus a few data bytes.
    fn header_with_tag(tag: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&42u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&44_100u32.to_le_bytes());
        bytes.extend_from_slice(&(44_100u32 * 6).to_le_bytes());
        bytes.extend_from_slice(&6u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&[0xFE, 0xFF, 0x01, 0x00, 0x7F, 0x80]);
        bytes
    }

    #[test]
    fn rewrites_extensible_tag_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let original = header_with_tag(WAVE_FORMAT_EXTENSIBLE);
        assert_eq!(&original[20..22], &[0xFE, 0xFF]);
        std::fs::write(&path, &original).unwrap();

        assert!(normalize_format_tag(&path).unwrap());

        let patched = std::fs::read(&path).unwrap();
        assert_eq!(&patched[20..22], &[0x01, 0x00]);
        assert_eq!(patched.len(), original.len());
        for (i, (a, b)) in original.iter().zip(&patched).enumerate() {
            if i != 20 && i != 21 {
                assert_eq!(a, b, "byte {i} changed");
            }
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        std::fs::write(&path, header_with_tag(WAVE_FORMAT_EXTENSIBLE)).unwrap();

        assert!(normalize_format_tag(&path).unwrap());
        let once = std::fs::read(&path).unwrap();
        assert!(!normalize_format_tag(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), once);
    }

    #[test]
    fn other_tags_are_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        for tag in [WAVE_FORMAT_PCM, 0x0003, 0xFFFF, 0xFEFF] {
            let original = header_with_tag(tag);
            std::fs::write(&path, &original).unwrap();
            assert!(!normalize_format_tag(&path).unwrap());
            assert_eq!(std::fs::read(&path).unwrap(), original);
        }
    }

    #[test]
    fn short_file_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        assert!(!normalize_format_tag(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");
    }

    #[test]
    fn missing_file_is_a_patch_error() {
        let dir = tempdir().unwrap();
        let err = normalize_format_tag(&dir.path().join("gone.wav")).unwrap_err();
        assert!(matches!(err, OffsetError::HeaderPatch { .. }));
    }
}
