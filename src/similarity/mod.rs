//! Scoring how closely a live pose matches a reference pose.
//!
//! Both poses are normalized for position and size before their joints are
//! compared, so the score does not depend on where the subject stands in the
//! frame or how far away the camera is.

use crate::{
    error::Error,
    pose::{
        constants::{COMPARISON_SET, MIN_KEYPOINT_SCORE, SCALE_REFERENCE},
        Keypoint, KeypointKind, Pose, NUM_KEYPOINTS,
    },
};
use ordered_float::OrderedFloat;
use point::Point;
use serde::Serialize;
use std::f64::consts::PI;
use tracing::warn;

mod point;

/// Per-joint similarities below this are reported as needing adjustment.
pub const ADJUSTMENT_THRESHOLD: f64 = 40.0;
const MAX_ADJUSTMENTS: usize = 2;

const FLOOR: f64 = 40.0;
const RESCALE: f64 = 0.6;

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct KeypointSimilarity {
    #[serde(rename = "name")]
    pub kind: KeypointKind,
    /// Boosted similarity in `[0, 100]`, before the final rescale.
    pub similarity: f64,
    /// Mean score of the two compared keypoints.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub overall: f64,
    pub per_keypoint: Vec<KeypointSimilarity>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchGrade {
    Poor,
    Fair,
    Good,
}

impl MatchGrade {
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "good match",
            Self::Fair => "fair match",
            Self::Poor => "poor match",
        }
    }
}

impl SimilarityResult {
    /// The result reported when a comparison has nothing to work with.
    pub fn degraded() -> Self {
        Self {
            overall: 0.0,
            per_keypoint: Vec::new(),
        }
    }

    pub fn grade(&self) -> MatchGrade {
        if self.overall >= 50.0 {
            MatchGrade::Good
        } else if self.overall >= 30.0 {
            MatchGrade::Fair
        } else {
            MatchGrade::Poor
        }
    }

    /// The worst matching joints, lowest first, at most two.
    pub fn needs_adjustment(&self) -> Vec<KeypointSimilarity> {
        let mut below = self
            .per_keypoint
            .iter()
            .copied()
            .filter(|joint| joint.similarity < ADJUSTMENT_THRESHOLD)
            .collect::<Vec<_>>();
        below.sort_by_key(|joint| OrderedFloat(joint.similarity));
        below.truncate(MAX_ADJUSTMENTS);
        below
    }
}

/// A pose translated to its centroid and divided by its torso length.
struct Normalized {
    joints: [Option<Keypoint>; NUM_KEYPOINTS],
    centroid: Point,
    scale: f64,
}

fn detected(keypoint: &Option<Keypoint>) -> Option<&Keypoint> {
    keypoint
        .as_ref()
        .filter(|keypoint| keypoint.score > MIN_KEYPOINT_SCORE)
}

fn position(keypoint: &Keypoint) -> Result<Point, Error> {
    Point::new(f64::from(keypoint.x), f64::from(keypoint.y))
}

impl Normalized {
    fn new(pose: &Pose) -> Result<Self, Error> {
        let joints = pose.by_kind()?;

        let mut qualifying = Vec::with_capacity(COMPARISON_SET.len());
        for kind in COMPARISON_SET.iter() {
            if let Some(keypoint) = detected(&joints[kind.idx()?]) {
                qualifying.push(position(keypoint)?);
            }
        }
        let centroid = Point::centroid(qualifying);

        let (upper, lower) = SCALE_REFERENCE;
        let scale = match (
            detected(&joints[upper.idx()?]),
            detected(&joints[lower.idx()?]),
        ) {
            (Some(upper), Some(lower)) => position(upper)?.distance(position(lower)?),
            _ => 1.0,
        };
        let scale = if scale > 0.0 && scale.is_finite() {
            scale
        } else {
            1.0
        };

        Ok(Self {
            joints,
            centroid,
            scale,
        })
    }

    /// The normalized position of `kind`, if it was detected.
    fn joint(&self, kind: KeypointKind) -> Result<Option<(Point, f32)>, Error> {
        match detected(&self.joints[kind.idx()?]) {
            Some(keypoint) => {
                let point = (position(keypoint)? - self.centroid) / self.scale;
                Ok(Some((point, keypoint.score)))
            }
            None => Ok(None),
        }
    }
}

fn raw_similarity(distance: f64) -> f64 {
    (100.0 - 25.0 * distance).max(0.0)
}

/// Lifts low and medium scores while keeping 0 and 100 fixed.
fn boost(raw: f64) -> f64 {
    (raw + 50.0 * (PI * raw / 100.0).sin()).min(100.0)
}

fn rescale(overall: f64) -> f64 {
    (FLOOR + overall * RESCALE).min(100.0)
}

fn try_compare(reference: &Pose, current: &Pose) -> Result<SimilarityResult, Error> {
    let reference = Normalized::new(reference)?;
    let current = Normalized::new(current)?;

    let mut per_keypoint = Vec::with_capacity(COMPARISON_SET.len());
    for &kind in COMPARISON_SET.iter() {
        if let (Some((expected, expected_score)), Some((actual, actual_score))) =
            (reference.joint(kind)?, current.joint(kind)?)
        {
            let similarity = boost(raw_similarity(expected.distance(actual)));
            per_keypoint.push(KeypointSimilarity {
                kind,
                similarity,
                confidence: (f64::from(expected_score) + f64::from(actual_score)) / 2.0,
            });
        }
    }

    let overall = if per_keypoint.is_empty() {
        0.0
    } else {
        per_keypoint.iter().map(|joint| joint.similarity).sum::<f64>() / per_keypoint.len() as f64
    };

    Ok(SimilarityResult {
        overall: rescale(overall),
        per_keypoint,
    })
}

/// Score `current` against `reference` in `[0, 100]`.
///
/// Never fails: poses that cannot be compared, for instance because a
/// coordinate is NaN, produce [`SimilarityResult::degraded`].
pub fn compare(reference: &Pose, current: &Pose) -> SimilarityResult {
    try_compare(reference, current).unwrap_or_else(|error| {
        warn!(message = "pose comparison degraded", %error);
        SimilarityResult::degraded()
    })
}

/// Compare poses that may not have been detected at all.
pub fn compare_detected(reference: Option<&Pose>, current: Option<&Pose>) -> SimilarityResult {
    match (reference, current) {
        (Some(reference), Some(current)) => compare(reference, current),
        _ => SimilarityResult::degraded(),
    }
}
