use crate::error::Error;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "video")]
pub mod video_file;

/// How much of a media source has been loaded, in increasing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Nothing,
    Metadata,
    CurrentData,
    EnoughData,
}

/// Signals emitted by a media source.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded,
    /// The first frame at the current position can be decoded.
    DataLoaded,
    /// Playback moved the position to the given media time.
    TimeAdvanced(f64),
    SeekCompleted,
    Ended,
    DecodeError(String),
}

/// A seekable, playable, byte-backed video.
///
/// Controls are synchronous; their effects are reported later through
/// [`MediaSource::next_event`]. None of the signals are guaranteed to arrive,
/// so callers must bound every wait on them.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    fn ready_state(&self) -> ReadyState;

    /// Duration in seconds. May be NaN or infinite for freshly recorded media.
    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    /// Raw `(width, height)` of decoded frames.
    fn dimensions(&self) -> (u32, u32);

    fn is_paused(&self) -> bool;

    /// Request a seek. Completion is signalled by [`MediaEvent::SeekCompleted`].
    fn seek(&mut self, time_seconds: f64) -> Result<(), Error>;

    fn play(&mut self) -> Result<(), Error>;

    fn pause(&mut self);

    /// Detach and reattach the underlying bytes, restarting loading.
    fn reload(&mut self) -> Result<(), Error>;

    /// Encode the currently decoded frame.
    fn capture_frame(&mut self) -> Result<Vec<u8>, Error>;

    /// Wait for the next signal. Pending forever when nothing will happen.
    async fn next_event(&mut self) -> MediaEvent;
}
