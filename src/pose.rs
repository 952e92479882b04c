use crate::error::Error;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, io::Read};
use tracing::warn;

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
)]
#[serde(rename_all = "snake_case")]
pub enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointKind {
    pub fn idx(self) -> Result<usize, Error> {
        self.to_usize().ok_or(Error::KeypointVariantToUSize(self))
    }

    /// Human readable joint name, e.g. `left shoulder`.
    pub fn label(self) -> &'static str {
        use KeypointKind::*;
        match self {
            Nose => "nose",
            LeftEye => "left eye",
            RightEye => "right eye",
            LeftEar => "left ear",
            RightEar => "right ear",
            LeftShoulder => "left shoulder",
            RightShoulder => "right shoulder",
            LeftElbow => "left elbow",
            RightElbow => "right elbow",
            LeftWrist => "left wrist",
            RightWrist => "right wrist",
            LeftHip => "left hip",
            RightHip => "right hip",
            LeftKnee => "left knee",
            RightKnee => "right knee",
            LeftAnkle => "left ankle",
            RightAnkle => "right ankle",
        }
    }
}

pub const NUM_KEYPOINTS: usize = 17;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    #[serde(rename = "name")]
    pub kind: KeypointKind,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Keypoint {
    pub fn new(kind: KeypointKind, x: f32, y: f32, score: f32) -> Self {
        Self { kind, x, y, score }
    }
}

/// One estimator output for a single frame.
///
/// Keypoint names are unique within a pose. Poses are never mutated; display
/// and mirroring produce re-projected copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPose")]
pub struct Pose {
    keypoints: Vec<Keypoint>,
    score: f32,
}

#[derive(Deserialize)]
struct RawPose {
    keypoints: Vec<Keypoint>,
    score: f32,
}

impl TryFrom<RawPose> for Pose {
    type Error = Error;

    fn try_from(raw: RawPose) -> Result<Self, Self::Error> {
        Self::new(raw.keypoints, raw.score)
    }
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>, score: f32) -> Result<Self, Error> {
        let mut seen = [false; NUM_KEYPOINTS];
        for keypoint in &keypoints {
            let index = keypoint.kind.idx()?;
            if std::mem::replace(&mut seen[index], true) {
                return Err(Error::DuplicateKeypoint(keypoint.kind));
            }
        }
        Ok(Self { keypoints, score })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn get(&self, kind: KeypointKind) -> Option<&Keypoint> {
        self.keypoints.iter().find(|keypoint| keypoint.kind == kind)
    }

    /// Keypoints laid out by [`KeypointKind::idx`].
    pub(crate) fn by_kind(&self) -> Result<[Option<Keypoint>; NUM_KEYPOINTS], Error> {
        let mut table = [None; NUM_KEYPOINTS];
        for &keypoint in &self.keypoints {
            table[keypoint.kind.idx()?] = Some(keypoint);
        }
        Ok(table)
    }

    /// Mirror the pose around the vertical center line of a frame `width` wide.
    pub fn mirrored(&self, width: f32) -> Self {
        Self {
            keypoints: self
                .keypoints
                .iter()
                .map(|&keypoint| Keypoint {
                    x: width - keypoint.x,
                    ..keypoint
                })
                .collect(),
            score: self.score,
        }
    }

    /// Read a live detection. A document that is not a valid pose, such as
    /// one without keypoints, is treated as no detection.
    pub fn detected_from_reader<R: Read>(reader: R) -> Option<Self> {
        match serde_json::from_reader(reader) {
            Ok(pose) => Some(pose),
            Err(error) => {
                warn!(message = "treating unreadable pose as undetected", %error);
                None
            }
        }
    }
}

pub mod constants {
    use crate::pose::KeypointKind::{self, *};

    /// Minimum keypoint score for a joint to count as detected.
    pub const MIN_KEYPOINT_SCORE: f32 = 0.15;

    /// Joints compared between poses. Facial points other than the nose are
    /// too unstable to be useful.
    pub const COMPARISON_SET: [KeypointKind; 13] = [
        Nose,
        LeftShoulder,
        RightShoulder,
        LeftElbow,
        RightElbow,
        LeftWrist,
        RightWrist,
        LeftHip,
        RightHip,
        LeftKnee,
        RightKnee,
        LeftAnkle,
        RightAnkle,
    ];

    /// The torso segment whose length normalizes pose size.
    pub const SCALE_REFERENCE: (KeypointKind, KeypointKind) = (LeftShoulder, LeftHip);
}
