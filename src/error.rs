use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop processing of a single file.
///
/// Parameter and tempo problems never show up here: they are recovered with
/// a default value where they happen.
#[derive(Debug, Error)]
pub enum OffsetError {
    #[error("could not determine sample rate or channels of {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("ffmpeg exited with {status}:\n{stderr}")]
    Transcode { status: String, stderr: String },

    #[error("failed to patch WAV header of {path}: {source}")]
    HeaderPatch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} is not installed or not found in PATH")]
    ToolMissing { tool: &'static str },

    #[error("output {0} is already being written by another job")]
    OutputClaimed(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type OffsetResult<T> = std::result::Result<T, OffsetError>;
