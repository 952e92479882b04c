use crate::{
    error::Error,
    media::{MediaEvent, MediaSource, ReadyState},
};
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Vector},
    imgcodecs::{imencode, IMWRITE_JPEG_QUALITY},
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_MSEC,
    },
};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const JPEG_QUALITY: i32 = 50;

/// A video file decoded with OpenCV.
///
/// Seeks complete synchronously, but are still reported through
/// [`MediaEvent::SeekCompleted`] like any other source.
pub struct VideoFile {
    path: PathBuf,
    capture: VideoCapture,
    frame: Mat,
    decoded: bool,
    ready: ReadyState,
    duration: f64,
    fps: f64,
    dimensions: (u32, u32),
    position: f64,
    paused: bool,
    pending: VecDeque<MediaEvent>,
}

fn open_capture(path: &Path) -> Result<VideoCapture, Error> {
    let name = path.to_string_lossy();
    let capture =
        VideoCapture::from_file(&name, CAP_ANY).map_err(|e| Error::OpenVideo(e, path.into()))?;
    if !capture
        .is_opened()
        .map_err(|e| Error::OpenVideo(e, path.into()))?
    {
        return Err(Error::VideoNotOpened(path.into()));
    }
    Ok(capture)
}

impl VideoFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let capture = open_capture(&path)?;
        let mut video = Self {
            path,
            capture,
            frame: Mat::default(),
            decoded: false,
            ready: ReadyState::Nothing,
            duration: f64::NAN,
            fps: 0.0,
            dimensions: (0, 0),
            position: 0.0,
            paused: true,
            pending: VecDeque::new(),
        };
        video.load()?;
        Ok(video)
    }

    fn property(&self, property: i32) -> Result<f64, Error> {
        self.capture
            .get(property)
            .map_err(Error::GetCaptureProperty)
    }

    fn load(&mut self) -> Result<(), Error> {
        self.fps = self.property(CAP_PROP_FPS)?;
        let frames = self.property(CAP_PROP_FRAME_COUNT)?;
        self.duration = if self.fps > 0.0 && frames > 0.0 {
            frames / self.fps
        } else {
            f64::INFINITY
        };
        self.dimensions = (
            self.property(CAP_PROP_FRAME_WIDTH)?.to_u32().unwrap_or(0),
            self.property(CAP_PROP_FRAME_HEIGHT)?.to_u32().unwrap_or(0),
        );
        self.ready = ReadyState::Metadata;
        self.pending.push_back(MediaEvent::MetadataLoaded);

        info!(
            message = "opened video",
            path = %self.path.display(),
            duration = self.duration,
            width = self.dimensions.0,
            height = self.dimensions.1
        );

        if self.decode()? {
            self.ready = ReadyState::EnoughData;
            self.pending.push_back(MediaEvent::DataLoaded);
        }
        Ok(())
    }

    /// Decode the frame at the capture position. `false` at end of stream.
    fn decode(&mut self) -> Result<bool, Error> {
        self.decoded = self
            .capture
            .read(&mut self.frame)
            .map_err(Error::ReadFrame)?;
        if self.decoded {
            self.position = self.property(CAP_PROP_POS_MSEC)? / 1000.0;
        }
        Ok(self.decoded)
    }

    /// Start time of the last decodable frame.
    fn last_frame(&self) -> f64 {
        if self.fps > 0.0 && self.duration.is_finite() {
            (self.duration - self.fps.recip()).max(0.0)
        } else {
            self.duration
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for VideoFile {
    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn seek(&mut self, time_seconds: f64) -> Result<(), Error> {
        // Seeking to the end decodes nothing, so land on the last frame.
        let time_seconds = time_seconds.min(self.last_frame());
        self.capture
            .set(CAP_PROP_POS_MSEC, time_seconds * 1000.0)
            .map_err(Error::SetCapturePosition)?;
        if self.decode()? {
            debug!(
                message = "seeked",
                target = time_seconds,
                position = self.position
            );
            self.pending.push_back(MediaEvent::SeekCompleted);
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), Error> {
        if self.ready < ReadyState::CurrentData {
            return Err(Error::Playback(format!(
                "{} has no decodable frames",
                self.path.display()
            )));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn reload(&mut self) -> Result<(), Error> {
        self.capture = open_capture(&self.path)?;
        self.ready = ReadyState::Nothing;
        self.decoded = false;
        self.paused = true;
        self.pending.clear();
        self.load()
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>, Error> {
        if !self.decoded {
            return Err(Error::NotReady(self.ready));
        }
        let mut buffer = Vector::<u8>::new();
        let params = Vector::<i32>::from(vec![IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
        imencode(".jpg", &self.frame, &mut buffer, &params).map_err(Error::EncodeFrame)?;
        Ok(buffer.to_vec())
    }

    async fn next_event(&mut self) -> MediaEvent {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }
        if self.paused {
            return std::future::pending().await;
        }

        tokio::task::yield_now().await;
        match self.decode() {
            Ok(true) => MediaEvent::TimeAdvanced(self.position),
            Ok(false) => {
                self.paused = true;
                MediaEvent::Ended
            }
            Err(error) => MediaEvent::DecodeError(error.to_string()),
        }
    }
}
