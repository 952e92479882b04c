use crate::{error::Error, frame::FrameSample, pose::Pose};
use ordered_float::OrderedFloat;
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path};
use tracing::debug;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EstimateOptions {
    pub flip_horizontal: bool,
}

/// Maps a captured frame to zero or more candidate poses.
#[async_trait::async_trait]
pub trait PoseEstimator: Send {
    /// Candidate poses for `frame`, highest confidence first. An empty vector
    /// means nothing was detected and is not an error.
    async fn estimate(
        &mut self,
        frame: &FrameSample,
        options: EstimateOptions,
    ) -> Result<Vec<Pose>, Error>;
}

const DEFAULT_TOLERANCE: f64 = 0.05;

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

#[derive(Debug, Clone, Deserialize)]
struct TrackFrame {
    timestamp_seconds: f64,
    poses: Vec<Pose>,
}

/// Poses estimated ahead of time, looked up by frame timestamp.
///
/// ```json
/// {
///   "width": 640,
///   "frames": [
///     { "timestamp_seconds": 0.0, "poses": [{ "score": 0.9, "keypoints": [...] }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PoseTrack {
    /// Frame width, needed to mirror poses.
    #[serde(default)]
    width: Option<f32>,
    /// Largest timestamp distance at which a track entry still matches a frame.
    #[serde(default = "default_tolerance")]
    tolerance: f64,
    frames: Vec<TrackFrame>,
}

impl Default for PoseTrack {
    /// A track that detects nothing.
    fn default() -> Self {
        Self {
            width: None,
            tolerance: DEFAULT_TOLERANCE,
            frames: Vec::new(),
        }
    }
}

impl PoseTrack {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let mut track: Self = serde_json::from_reader(reader).map_err(Error::ParsePoses)?;
        for frame in &mut track.frames {
            frame
                .poses
                .sort_by_key(|pose| std::cmp::Reverse(OrderedFloat(pose.score())));
        }
        Ok(track)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::ReadPoseFile(e, path.to_path_buf()))?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn poses_at(&self, timestamp_seconds: f64) -> &[Pose] {
        self.frames
            .iter()
            .filter(|frame| (frame.timestamp_seconds - timestamp_seconds).abs() <= self.tolerance)
            .min_by_key(|frame| OrderedFloat((frame.timestamp_seconds - timestamp_seconds).abs()))
            .map(|frame| frame.poses.as_slice())
            .unwrap_or(&[])
    }
}

#[async_trait::async_trait]
impl PoseEstimator for PoseTrack {
    async fn estimate(
        &mut self,
        frame: &FrameSample,
        options: EstimateOptions,
    ) -> Result<Vec<Pose>, Error> {
        let poses = self.poses_at(frame.timestamp_seconds);
        debug!(
            message = "looked up poses",
            timestamp = frame.timestamp_seconds,
            found = poses.len()
        );
        if options.flip_horizontal {
            let width = self.width.ok_or(Error::MissingFrameWidth)?;
            Ok(poses.iter().map(|pose| pose.mirrored(width)).collect())
        } else {
            Ok(poses.to_vec())
        }
    }
}
