use crate::{error::Error, pose::Pose};
use ordered_float::OrderedFloat;
use serde::Serialize;

/// One decoded frame captured at a known media time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSample {
    pub index: usize,
    pub timestamp_seconds: f64,
    /// Encoded raster (JPEG for the OpenCV source).
    #[serde(skip_serializing)]
    pub image: Vec<u8>,
}

impl FrameSample {
    pub fn new(index: usize, timestamp_seconds: f64, image: Vec<u8>) -> Self {
        Self {
            index,
            timestamp_seconds,
            image,
        }
    }
}

/// An ordered, non-empty sequence of frames.
///
/// Timestamps are non-decreasing and `index` equals position.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSeries(Vec<FrameSample>);

impl FrameSeries {
    /// Sort `frames` by timestamp and re-index them `0..n`.
    pub fn from_samples(mut frames: Vec<FrameSample>) -> Result<Self, Error> {
        if frames.is_empty() {
            return Err(Error::EmptyResult);
        }
        // stable, so captures at equal times keep capture order
        frames.sort_by_key(|frame| OrderedFloat(frame.timestamp_seconds));
        frames
            .iter_mut()
            .enumerate()
            .for_each(|(index, frame)| frame.index = index);
        Ok(Self(frames))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn frames(&self) -> &[FrameSample] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Result<&FrameSample, Error> {
        self.0.get(index).ok_or(Error::FrameOutOfRange {
            index,
            len: self.0.len(),
        })
    }

    /// The frame whose timestamp is closest to `time_seconds`; ties go to the
    /// earlier frame.
    pub fn nearest(&self, time_seconds: f64) -> &FrameSample {
        let after = self
            .0
            .partition_point(|frame| frame.timestamp_seconds < time_seconds);
        match (after.checked_sub(1), self.0.get(after)) {
            (Some(before), Some(next)) => {
                let before = &self.0[before];
                if next.timestamp_seconds - time_seconds < time_seconds - before.timestamp_seconds
                {
                    next
                } else {
                    before
                }
            }
            (Some(before), None) => &self.0[before],
            (None, Some(next)) => next,
            // from_samples guarantees at least one frame
            (None, None) => &self.0[0],
        }
    }

    /// Media time covered by the series.
    pub fn span_seconds(&self) -> f64 {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => last.timestamp_seconds - first.timestamp_seconds,
            _ => 0.0,
        }
    }
}

/// The reference pose chosen from a recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedPose {
    pub frame_index: usize,
    pub timestamp_seconds: f64,
    pub pose: Pose,
    pub source_frame: FrameSample,
}
