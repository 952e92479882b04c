//! Scripted media source for exercising the sampler's timing contract.

use crate::{
    error::Error,
    media::{MediaEvent, MediaSource, ReadyState},
};
use std::{collections::VecDeque, time::Duration};

/// How the fake answers one seek request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SeekResponse {
    Immediate,
    Delayed(Duration),
    /// Completes immediately but lands `offset` seconds away from the target.
    Lands(f64),
    /// Moves the position but never signals completion.
    Silent,
}

/// How the fake answers a reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LoadResponse {
    Ready,
    MetadataOnly,
    Never,
}

#[derive(Debug)]
enum Pending {
    Seek { target: f64, response: SeekResponse },
    Metadata,
    Data,
}

#[derive(Debug)]
pub(crate) struct FakeSource {
    pub(crate) ready: ReadyState,
    pub(crate) duration: f64,
    /// Where playback actually ends, independent of the reported duration.
    pub(crate) length: f64,
    pub(crate) dimensions: (u32, u32),
    pub(crate) current_time: f64,
    pub(crate) paused: bool,
    /// Wall-clock time between playback events.
    pub(crate) tick: Duration,
    /// Media time advanced per playback event.
    pub(crate) step: f64,
    pub(crate) seeks: VecDeque<SeekResponse>,
    /// Seeks to the end of playback never complete, as with decoders that
    /// have no frame there.
    pub(crate) silent_at_end: bool,
    pub(crate) load: LoadResponse,
    pub(crate) fail_play: bool,
    pub(crate) decode_error_at: Option<f64>,
    pub(crate) seek_log: Vec<f64>,
    pub(crate) reloads: usize,
    pub(crate) pauses: usize,
    pending: VecDeque<Pending>,
}

impl FakeSource {
    /// A loaded ten second clip at 30 frames per second.
    pub(crate) fn new() -> Self {
        Self {
            ready: ReadyState::EnoughData,
            duration: 10.0,
            length: 10.0,
            dimensions: (640, 480),
            current_time: 0.0,
            paused: true,
            tick: Duration::from_millis(33),
            step: 1.0 / 30.0,
            seeks: VecDeque::new(),
            silent_at_end: false,
            load: LoadResponse::Ready,
            fail_play: false,
            decode_error_at: None,
            seek_log: Vec::new(),
            reloads: 0,
            pauses: 0,
            pending: VecDeque::new(),
        }
    }

    /// A recording whose container never reported a duration.
    pub(crate) fn unbounded(length: f64) -> Self {
        Self {
            duration: f64::INFINITY,
            length,
            ..Self::new()
        }
    }

    pub(crate) fn with_seeks(mut self, responses: &[SeekResponse]) -> Self {
        self.seeks = responses.iter().copied().collect();
        self
    }
}

#[async_trait::async_trait]
impl MediaSource for FakeSource {
    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn seek(&mut self, time_seconds: f64) -> Result<(), Error> {
        let target = time_seconds.max(0.0).min(self.length);
        self.seek_log.push(target);
        let response = self.seeks.pop_front().unwrap_or(SeekResponse::Immediate);
        let response = if self.silent_at_end && target >= self.length {
            SeekResponse::Silent
        } else {
            response
        };
        self.pending.push_back(Pending::Seek { target, response });
        Ok(())
    }

    fn play(&mut self) -> Result<(), Error> {
        if self.fail_play {
            return Err(Error::Playback("playback was rejected".into()));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.pauses += 1;
        self.paused = true;
    }

    fn reload(&mut self) -> Result<(), Error> {
        self.reloads += 1;
        self.ready = ReadyState::Nothing;
        self.current_time = 0.0;
        self.paused = true;
        self.pending.clear();
        match self.load {
            LoadResponse::Ready => {
                self.pending.push_back(Pending::Metadata);
                self.pending.push_back(Pending::Data);
            }
            LoadResponse::MetadataOnly => self.pending.push_back(Pending::Metadata),
            LoadResponse::Never => {}
        }
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>, Error> {
        Ok(format!("frame@{:.3}", self.current_time).into_bytes())
    }

    async fn next_event(&mut self) -> MediaEvent {
        while let Some(pending) = self.pending.pop_front() {
            match pending {
                Pending::Seek { target, response } => match response {
                    SeekResponse::Immediate => {
                        self.current_time = target;
                        return MediaEvent::SeekCompleted;
                    }
                    SeekResponse::Delayed(delay) => {
                        tokio::time::sleep(delay).await;
                        self.current_time = target;
                        return MediaEvent::SeekCompleted;
                    }
                    SeekResponse::Lands(offset) => {
                        self.current_time = (target + offset).max(0.0);
                        return MediaEvent::SeekCompleted;
                    }
                    SeekResponse::Silent => self.current_time = target,
                },
                Pending::Metadata => {
                    self.ready = ReadyState::Metadata;
                    return MediaEvent::MetadataLoaded;
                }
                Pending::Data => {
                    self.ready = ReadyState::EnoughData;
                    return MediaEvent::DataLoaded;
                }
            }
        }

        if self.paused || self.ready < ReadyState::CurrentData {
            return std::future::pending().await;
        }

        tokio::time::sleep(self.tick).await;
        self.current_time += self.step;
        if let Some(at) = self.decode_error_at {
            if self.current_time >= at {
                return MediaEvent::DecodeError("corrupt frame".into());
            }
        }
        if self.current_time >= self.length {
            self.current_time = self.length;
            self.paused = true;
            return MediaEvent::Ended;
        }
        MediaEvent::TimeAdvanced(self.current_time)
    }
}
