//! Frame extraction from media sources whose seek signalling is unreliable.
//!
//! Every wait on the source is bounded. [`Sampler::capture_at`] performs at
//! most one corrective re-seek; anything beyond that is left to the caller.

use crate::{
    config::{SamplerConfig, MAX_TARGET_COUNT},
    error::{Error, ErrorKind},
    frame::{FrameSample, FrameSeries},
    media::{MediaEvent, MediaSource, ReadyState},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wait::{wait_for, PauseOnDrop, Waited};

mod wait;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SamplerState {
    Idle,
    Seeking { attempt: u8, deadline: Instant },
    Capturing,
    Failed(ErrorKind),
}

/// Extraction progress, reported once per captured frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Progress {
    pub captured: usize,
    pub target: usize,
}

impl Progress {
    /// Percentage done, held at 99 until extraction finishes.
    pub fn percent(self) -> u8 {
        let percent = (self.captured as f64 / self.target.max(1) as f64 * 100.0).round();
        percent.min(99.0) as u8
    }
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

pub struct Sampler {
    config: SamplerConfig,
    state: SamplerState,
    progress: Option<ProgressFn>,
}

fn seek_completed(event: &MediaEvent) -> Option<()> {
    match event {
        MediaEvent::SeekCompleted => Some(()),
        _ => None,
    }
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            state: SamplerState::Idle,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.set_progress(progress);
        self
    }

    pub fn set_progress(&mut self, progress: ProgressFn) {
        self.progress = Some(progress);
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn finish<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.state = match &result {
            Ok(_) => SamplerState::Idle,
            Err(error) => SamplerState::Failed(error.kind()),
        };
        result
    }

    /// Capture the frame at `time_seconds`, clamped into `[0, duration]`.
    ///
    /// The returned sample has index 0; callers assembling a series re-index.
    pub async fn capture_at<S>(
        &mut self,
        source: &mut S,
        time_seconds: f64,
    ) -> Result<FrameSample, Error>
    where
        S: MediaSource + ?Sized,
    {
        let result = self.try_capture_at(source, time_seconds).await;
        self.finish(result)
    }

    async fn try_capture_at<S>(
        &mut self,
        source: &mut S,
        time_seconds: f64,
    ) -> Result<FrameSample, Error>
    where
        S: MediaSource + ?Sized,
    {
        let ready = source.ready_state();
        if ready < ReadyState::CurrentData {
            return Err(Error::NotReady(ready));
        }

        let duration = source.duration();
        if duration.is_nan() || duration <= 0.0 {
            return Err(Error::InvalidDuration(duration));
        }

        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidSource { width, height });
        }

        let target = time_seconds.max(0.0).min(duration);
        if target != time_seconds {
            debug!(
                message = "clamped capture time",
                requested = time_seconds,
                target,
                duration
            );
        }

        if !source.is_paused() {
            source.pause();
        }

        let tolerance = self.config.seek_tolerance;
        let landed = self
            .seek(source, target, 1, self.config.seek_timeout())
            .await?;
        match landed {
            Some(position) if (position - target).abs() <= tolerance => {}
            landed => {
                warn!(
                    message = "seek missed target, re-seeking",
                    target,
                    landed = ?landed
                );
                let adjusted = target + self.config.corrective_nudge;
                let corrected = self
                    .seek(source, adjusted, 2, self.config.corrective_timeout())
                    .await?;
                match corrected {
                    Some(position) if (position - target).abs() > tolerance => warn!(
                        message = "corrective seek still off target, capturing anyway",
                        target,
                        position
                    ),
                    Some(_) => {}
                    None => {
                        let waited = if landed.is_none() {
                            self.config.seek_timeout() + self.config.corrective_timeout()
                        } else {
                            self.config.corrective_timeout()
                        };
                        return Err(Error::SeekTimeout { target, waited });
                    }
                }
            }
        }

        tokio::time::sleep(self.config.settle_delay()).await;
        self.state = SamplerState::Capturing;
        let image = source.capture_frame()?;
        let timestamp = source.current_time();
        debug!(
            message = "captured frame",
            target,
            timestamp,
            bytes = image.len()
        );
        Ok(FrameSample::new(0, timestamp.max(0.0), image))
    }

    /// Issue one seek and wait for it to complete. `None` means the
    /// completion signal never arrived.
    async fn seek<S>(
        &mut self,
        source: &mut S,
        target: f64,
        attempt: u8,
        bound: Duration,
    ) -> Result<Option<f64>, Error>
    where
        S: MediaSource + ?Sized,
    {
        tokio::time::sleep(self.config.settle_delay()).await;
        self.state = SamplerState::Seeking {
            attempt,
            deadline: Instant::now() + bound,
        };
        source.seek(target)?;
        match wait_for(source, bound, seek_completed).await? {
            Waited::Ready(()) => Ok(Some(source.current_time())),
            Waited::TimedOut => {
                warn!(message = "seek timed out", target, attempt, bound = ?bound);
                Ok(None)
            }
        }
    }

    /// Capture frames by playing the source from the start.
    ///
    /// Stops at `target_count` frames, at the end of the media, or when the
    /// wall-clock cap elapses. The source is paused on every exit path.
    pub async fn extract_series<S>(
        &mut self,
        source: &mut S,
        target_count: usize,
    ) -> Result<FrameSeries, Error>
    where
        S: MediaSource + ?Sized,
    {
        let result = self.try_extract_series(source, target_count).await;
        self.finish(result)
    }

    async fn try_extract_series<S>(
        &mut self,
        source: &mut S,
        target_count: usize,
    ) -> Result<FrameSeries, Error>
    where
        S: MediaSource + ?Sized,
    {
        if target_count == 0 {
            return Err(Error::InvalidTargetCount);
        }
        if source.ready_state() >= ReadyState::Metadata {
            let (width, height) = source.dimensions();
            if width == 0 || height == 0 {
                return Err(Error::InvalidSource { width, height });
            }
        }

        let started = Instant::now();
        let deadline = started + self.config.wall_clock_cap();
        let interval = self.config.sampling_interval;
        let mut frames = Vec::with_capacity(target_count.min(MAX_TARGET_COUNT));

        let mut source = PauseOnDrop::new(source);
        source.pause();
        source.seek(0.0)?;

        if source.ready_state() < ReadyState::CurrentData {
            let loaded = wait_for(&mut *source, self.config.data_timeout(), |event| {
                match event {
                    MediaEvent::DataLoaded => Some(()),
                    _ => None,
                }
            })
            .await?;
            if loaded == Waited::TimedOut {
                warn!("source has no decodable data at the start");
            }
        }

        let mut last_capture = f64::NEG_INFINITY;
        if source.ready_state() >= ReadyState::CurrentData {
            frames.push(FrameSample::new(0, 0.0, source.capture_frame()?));
            last_capture = 0.0;
            self.report(frames.len(), target_count);
        }

        source.play()?;
        self.state = SamplerState::Capturing;
        info!(message = "sampling during playback", target_count, interval);

        while frames.len() < target_count {
            let event = match tokio::time::timeout_at(deadline, source.next_event()).await {
                Ok(event) => event,
                Err(_) => {
                    info!(
                        message = "wall clock cap reached",
                        captured = frames.len(),
                        elapsed = ?started.elapsed()
                    );
                    break;
                }
            };
            match event {
                MediaEvent::TimeAdvanced(now) if now >= last_capture + interval => {
                    let index = frames.len();
                    frames.push(FrameSample::new(index, now, source.capture_frame()?));
                    last_capture = now;
                    self.report(frames.len(), target_count);
                    if frames.len() % 5 == 0 {
                        debug!(message = "captured frames", count = frames.len(), now);
                    }
                }
                MediaEvent::Ended => {
                    info!(message = "playback ended", captured = frames.len());
                    break;
                }
                MediaEvent::DecodeError(message) => return Err(Error::Decode(message)),
                _ => {}
            }
        }

        source.pause();
        info!(
            message = "extraction finished",
            frames = frames.len(),
            elapsed = ?started.elapsed()
        );
        FrameSeries::from_samples(frames)
    }

    pub(crate) fn report(&self, captured: usize, target: usize) {
        if let Some(progress) = &self.progress {
            progress(Progress { captured, target });
        }
    }

    /// Detach and reattach the source's bytes, then wait for it to load.
    ///
    /// Fails only when metadata never arrives. A missing first frame or a
    /// non-finite duration is tolerated.
    pub async fn reset<S>(&mut self, source: &mut S) -> Result<(), Error>
    where
        S: MediaSource + ?Sized,
    {
        let result = self.try_reset(source).await;
        self.finish(result)
    }

    async fn try_reset<S>(&mut self, source: &mut S) -> Result<(), Error>
    where
        S: MediaSource + ?Sized,
    {
        source.pause();
        source.reload()?;

        if source.ready_state() < ReadyState::Metadata {
            let loaded = wait_for(source, self.config.metadata_timeout(), |event| match event {
                MediaEvent::MetadataLoaded => Some(()),
                _ => None,
            })
            .await?;
            if loaded == Waited::TimedOut {
                warn!("metadata did not load after reset");
                return Err(Error::NotReady(source.ready_state()));
            }
        }

        let duration = source.duration();
        if !duration.is_finite() || duration <= 0.0 {
            warn!(message = "source duration is not usable, continuing", duration);
        }

        if source.ready_state() < ReadyState::CurrentData {
            let loaded = wait_for(source, self.config.data_timeout(), |event| match event {
                MediaEvent::DataLoaded => Some(()),
                _ => None,
            })
            .await?;
            if loaded == Waited::TimedOut {
                warn!("first frame did not load after reset, continuing");
            }
        }

        let (width, height) = source.dimensions();
        info!(
            message = "source reset",
            ready = ?source.ready_state(),
            duration,
            width,
            height
        );
        Ok(())
    }
}
