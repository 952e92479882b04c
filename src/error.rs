use crate::{media::ReadyState, pose::KeypointKind};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("media source is not ready for decoding (readiness: {0:?})")]
    NotReady(ReadyState),

    #[error("media source has invalid dimensions: {width}x{height}")]
    InvalidSource { width: u32, height: u32 },

    #[error("no seek-completed signal for target {target:.3}s after waiting {waited:?}")]
    SeekTimeout { target: f64, waited: Duration },

    #[error("no frames could be captured from the media source")]
    EmptyResult,

    #[error("media source reported an unusable duration: {0}")]
    InvalidDuration(f64),

    #[error("target frame count must be at least 1")]
    InvalidTargetCount,

    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("media source reported a decode error: {0}")]
    Decode(String),

    #[error("failed to start playback: {0}")]
    Playback(String),

    #[error("a sampling operation is already running against this source")]
    Busy,

    #[error("frame index {index} is out of range for a series of {len} frames")]
    FrameOutOfRange { index: usize, len: usize },

    #[error("no pose detected in frame {0}")]
    NoPose(usize),

    #[error("no reference pose has been selected")]
    NoReference,

    #[error("keypoint {0:?} appears more than once in a pose")]
    DuplicateKeypoint(KeypointKind),

    #[error("failed to convert keypoint variant to usize: {0:?}")]
    KeypointVariantToUSize(KeypointKind),

    #[error("failed to construct NotNan from f64: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f64),

    #[error("failed to read pose file: {1:?}")]
    ReadPoseFile(#[source] std::io::Error, std::path::PathBuf),

    #[error("failed to parse poses")]
    ParsePoses(#[source] serde_json::Error),

    #[error("flipping poses horizontally requires the frame width")]
    MissingFrameWidth,

    #[cfg(feature = "video")]
    #[error("failed to open video: {1:?}")]
    OpenVideo(#[source] opencv::Error, std::path::PathBuf),

    #[cfg(feature = "video")]
    #[error("video could not be opened: {0:?}")]
    VideoNotOpened(std::path::PathBuf),

    #[cfg(feature = "video")]
    #[error("failed to get video capture property")]
    GetCaptureProperty(#[source] opencv::Error),

    #[cfg(feature = "video")]
    #[error("failed to set video capture position")]
    SetCapturePosition(#[source] opencv::Error),

    #[cfg(feature = "video")]
    #[error("failed to read frame from video capture")]
    ReadFrame(#[source] opencv::Error),

    #[cfg(feature = "video")]
    #[error("failed to encode frame as jpeg")]
    EncodeFrame(#[source] opencv::Error),
}

/// Coarse classification of an [`Error`], used for fallback decisions and for
/// recording why the sampler failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotReady,
    InvalidSource,
    SeekTimeout,
    EmptyResult,
    Config,
    Decode,
    Busy,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::InvalidSource { .. } => ErrorKind::InvalidSource,
            Self::SeekTimeout { .. } => ErrorKind::SeekTimeout,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::InvalidDuration(_) | Self::InvalidTargetCount | Self::InvalidConfig(_) => {
                ErrorKind::Config
            }
            Self::Decode(_) | Self::Playback(_) => ErrorKind::Decode,
            Self::Busy => ErrorKind::Busy,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};
    use std::time::Duration;

    #[test]
    fn config_errors_share_a_kind() {
        assert_eq!(Error::InvalidDuration(f64::NAN).kind(), ErrorKind::Config);
        assert_eq!(Error::InvalidTargetCount.kind(), ErrorKind::Config);
        assert_eq!(Error::InvalidConfig("zero").kind(), ErrorKind::Config);
    }

    #[test]
    fn seek_timeout_message_names_target() {
        let error = Error::SeekTimeout {
            target: 1.5,
            waited: Duration::from_secs(8),
        };
        assert_eq!(error.kind(), ErrorKind::SeekTimeout);
        assert!(error.to_string().contains("1.500s"));
    }
}
