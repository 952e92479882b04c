use crate::error::Error;
use std::{str::FromStr, time::Duration};

const DEFAULT_SEEK_TIMEOUT: &str = "5";
const DEFAULT_CORRECTIVE_TIMEOUT: &str = "3";
const DEFAULT_SEEK_TOLERANCE: &str = "0.1";
const DEFAULT_CORRECTIVE_NUDGE: &str = "0.01";
const DEFAULT_SETTLE_DELAY: &str = "0.05";
const DEFAULT_SAMPLING_INTERVAL: &str = "0.1";
const DEFAULT_WALL_CLOCK_CAP: &str = "30";
const DEFAULT_METADATA_TIMEOUT: &str = "10";
const DEFAULT_DATA_TIMEOUT: &str = "10";
const DEFAULT_TARGET_COUNT: &str = "30";
const DEFAULT_STRATEGY: &str = "seek";

/// Upper bound for every configured time.
pub const MAX_SECONDS: f64 = 86_400.0;
/// Upper bound for the number of frames in one series.
pub const MAX_TARGET_COUNT: usize = 10_000;

/// Bounds and intervals for the frame sampler. All times are in seconds.
#[derive(Debug, Clone, PartialEq, structopt::StructOpt)]
pub struct SamplerConfig {
    /// How long to wait for a seek to complete.
    #[structopt(long, default_value = DEFAULT_SEEK_TIMEOUT)]
    pub seek_timeout: f64,

    /// How long to wait for the corrective re-seek to complete.
    #[structopt(long, default_value = DEFAULT_CORRECTIVE_TIMEOUT)]
    pub corrective_timeout: f64,

    /// Largest accepted distance between the requested and achieved position.
    #[structopt(long, default_value = DEFAULT_SEEK_TOLERANCE)]
    pub seek_tolerance: f64,

    /// Offset added to the target of the corrective re-seek.
    #[structopt(long, default_value = DEFAULT_CORRECTIVE_NUDGE)]
    pub corrective_nudge: f64,

    /// Pause before each seek and before capturing.
    #[structopt(long, default_value = DEFAULT_SETTLE_DELAY)]
    pub settle_delay: f64,

    /// Minimum media time between frames during continuous extraction.
    #[structopt(long, default_value = DEFAULT_SAMPLING_INTERVAL)]
    pub sampling_interval: f64,

    /// Wall-clock limit for continuous extraction.
    #[structopt(long, default_value = DEFAULT_WALL_CLOCK_CAP)]
    pub wall_clock_cap: f64,

    #[structopt(long, default_value = DEFAULT_METADATA_TIMEOUT)]
    pub metadata_timeout: f64,

    /// How long to wait for the first decodable frame.
    #[structopt(long, default_value = DEFAULT_DATA_TIMEOUT)]
    pub data_timeout: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seek_timeout: 5.0,
            corrective_timeout: 3.0,
            seek_tolerance: 0.1,
            corrective_nudge: 0.01,
            settle_delay: 0.05,
            sampling_interval: 0.1,
            wall_clock_cap: 30.0,
            metadata_timeout: 10.0,
            data_timeout: 10.0,
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_SECONDS)).unwrap_or_default()
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            (self.seek_timeout, "seek timeout must be positive"),
            (self.corrective_timeout, "corrective timeout must be positive"),
            (self.sampling_interval, "sampling interval must be positive"),
            (self.wall_clock_cap, "wall clock cap must be positive"),
            (self.metadata_timeout, "metadata timeout must be positive"),
            (self.data_timeout, "data timeout must be positive"),
        ];
        let non_negative = [
            (self.seek_tolerance, "seek tolerance must not be negative"),
            (self.corrective_nudge, "corrective nudge must not be negative"),
            (self.settle_delay, "settle delay must not be negative"),
        ];
        for &(value, message) in &positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(message));
            }
        }
        for &(value, message) in &non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidConfig(message));
            }
        }
        if positive
            .iter()
            .chain(&non_negative)
            .any(|&(value, _)| value > MAX_SECONDS)
        {
            return Err(Error::InvalidConfig("times must not exceed one day"));
        }
        Ok(())
    }

    pub fn seek_timeout(&self) -> Duration {
        seconds(self.seek_timeout)
    }

    pub fn corrective_timeout(&self) -> Duration {
        seconds(self.corrective_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        seconds(self.settle_delay)
    }

    pub fn wall_clock_cap(&self) -> Duration {
        seconds(self.wall_clock_cap)
    }

    pub fn metadata_timeout(&self) -> Duration {
        seconds(self.metadata_timeout)
    }

    pub fn data_timeout(&self) -> Duration {
        seconds(self.data_timeout)
    }
}

/// How the orchestrator builds a frame series.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Seek to evenly spaced times and capture each one.
    Seek,
    /// Play the source and capture frames as media time advances.
    Playback,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seek" => Ok(Self::Seek),
            "playback" => Ok(Self::Playback),
            other => Err(format!("unknown sampling strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, structopt::StructOpt)]
pub struct EngineConfig {
    #[structopt(flatten)]
    pub sampler: SamplerConfig,

    /// Number of frames to extract from a recording.
    #[structopt(short = "n", long, default_value = DEFAULT_TARGET_COUNT)]
    pub target_count: usize,

    /// Preferred extraction strategy: seek or playback.
    #[structopt(long, default_value = DEFAULT_STRATEGY, possible_values = &["seek", "playback"])]
    pub strategy: Strategy,

    /// Ask the estimator to mirror poses horizontally.
    #[structopt(long)]
    pub flip_horizontal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            target_count: 30,
            strategy: Strategy::Seek,
            flip_horizontal: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_count == 0 {
            return Err(Error::InvalidTargetCount);
        }
        if self.target_count > MAX_TARGET_COUNT {
            return Err(Error::InvalidConfig("target frame count exceeds 10000"));
        }
        self.sampler.validate()
    }
}
