//! Frame sampling from unreliable media sources and pose similarity scoring.

pub mod config;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod frame;
pub mod media;
pub mod pose;
pub mod sampler;
pub mod similarity;

pub use crate::{
    config::{EngineConfig, SamplerConfig, Strategy},
    engine::{Engine, Timing},
    error::{Error, ErrorKind},
    estimate::{EstimateOptions, PoseEstimator, PoseTrack},
    frame::{FrameSample, FrameSeries, SelectedPose},
    media::{MediaEvent, MediaSource, ReadyState},
    pose::{Keypoint, KeypointKind, Pose},
    sampler::{Progress, Sampler, SamplerState},
    similarity::{compare, compare_detected, MatchGrade, SimilarityResult},
};
