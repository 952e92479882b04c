use crate::{
    config::{EngineConfig, Strategy},
    error::{Error, ErrorKind},
    estimate::{EstimateOptions, PoseEstimator},
    frame::{FrameSample, FrameSeries, SelectedPose},
    media::{MediaSource, ReadyState},
    pose::Pose,
    sampler::{ProgressFn, Sampler},
    similarity::{self, SimilarityResult},
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Timing {
    pub inference: Duration,
    pub sampling: Duration,
}

struct Session<S> {
    source: S,
    sampler: Sampler,
    series: Option<Arc<FrameSeries>>,
    /// Freshly recorded media rarely seeks reliably.
    fresh: bool,
    sampling: Duration,
}

struct Inference<E> {
    estimator: E,
    elapsed: Duration,
}

/// Coordinates frame extraction, pose estimation and comparison for one
/// recording at a time.
///
/// At most one sampling operation runs against the source; a second request
/// made while one is in flight fails with [`Error::Busy`].
pub struct Engine<S, E> {
    config: EngineConfig,
    session: Mutex<Session<S>>,
    inference: Mutex<Inference<E>>,
    selected: Mutex<Option<SelectedPose>>,
}

impl<S, E> Engine<S, E>
where
    S: MediaSource,
    E: PoseEstimator,
{
    pub fn new(config: EngineConfig, source: S, estimator: E) -> Result<Self, Error> {
        config.validate()?;
        let sampler = Sampler::new(config.sampler.clone())?;
        Ok(Self {
            config,
            session: Mutex::new(Session {
                source,
                sampler,
                series: None,
                fresh: false,
                sampling: Duration::default(),
            }),
            inference: Mutex::new(Inference {
                estimator,
                elapsed: Duration::default(),
            }),
            selected: Mutex::new(None),
        })
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.session.get_mut().sampler.set_progress(progress);
        self
    }

    /// Mark the current source as freshly recorded.
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.session.get_mut().fresh = fresh;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn session(&self) -> Result<MutexGuard<'_, Session<S>>, Error> {
        self.session.try_lock().map_err(|_| Error::Busy)
    }

    /// Swap in a new recording, returning the old one. The cached series is
    /// dropped; the selected pose is kept.
    pub fn replace_source(&self, source: S, fresh: bool) -> Result<S, Error> {
        let mut session = self.session()?;
        session.series = None;
        session.fresh = fresh;
        info!(message = "replaced media source", fresh);
        Ok(std::mem::replace(&mut session.source, source))
    }

    /// Extract the frame series for the current source, or return the cached
    /// one.
    pub async fn extract(&self) -> Result<Arc<FrameSeries>, Error> {
        let mut session = self.session()?;
        self.series(&mut session).await
    }

    async fn series(&self, session: &mut Session<S>) -> Result<Arc<FrameSeries>, Error> {
        if let Some(series) = &session.series {
            return Ok(series.clone());
        }

        let start = tokio::time::Instant::now();
        let result = self.build_series(session).await;
        session.sampling += start.elapsed();

        let series = Arc::new(result?);
        info!(
            message = "extracted frame series",
            frames = series.len(),
            span = series.span_seconds(),
            elapsed = ?start.elapsed()
        );
        session.series = Some(series.clone());
        Ok(series)
    }

    fn strategy(&self, session: &Session<S>) -> Strategy {
        let duration = session.source.duration();
        if session.fresh || !duration.is_finite() || duration <= 0.0 {
            Strategy::Playback
        } else {
            self.config.strategy
        }
    }

    async fn build_series(&self, session: &mut Session<S>) -> Result<FrameSeries, Error> {
        let strategy = self.strategy(session);
        debug!(message = "chose extraction strategy", ?strategy);
        match strategy {
            Strategy::Playback => self.play_through(session).await,
            Strategy::Seek => match self.seek_through(session).await {
                Err(error) if error.kind() == ErrorKind::SeekTimeout => {
                    warn!(
                        message = "seeking is unreliable, falling back to playback",
                        %error
                    );
                    self.play_through(session).await
                }
                result => result,
            },
        }
    }

    async fn play_through(&self, session: &mut Session<S>) -> Result<FrameSeries, Error> {
        let Session {
            source, sampler, ..
        } = session;
        sampler.reset(source).await?;
        sampler
            .extract_series(source, self.config.target_count)
            .await
    }

    /// Capture frames at evenly spaced times in `[0, duration)`. The end of the
    /// media has no frame to land on, so it is never a target.
    async fn seek_through(&self, session: &mut Session<S>) -> Result<FrameSeries, Error> {
        let Session {
            source, sampler, ..
        } = session;
        if source.ready_state() < ReadyState::CurrentData {
            sampler.reset(source).await?;
        }

        let count = self.config.target_count;
        let duration = source.duration();

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let target = duration * index as f64 / count as f64;
            let mut frame = sampler.capture_at(source, target).await?;
            frame.index = index;
            frames.push(frame);
            sampler.report(frames.len(), count);
        }
        FrameSeries::from_samples(frames)
    }

    /// The cached frame at `index`, extracting first if needed.
    pub async fn frame(&self, index: usize) -> Result<FrameSample, Error> {
        let mut session = self.session()?;
        let series = self.series(&mut session).await?;
        Ok(series.get(index)?.clone())
    }

    /// The cached frame nearest to `time_seconds`, extracting first if needed.
    pub async fn capture_at(&self, time_seconds: f64) -> Result<FrameSample, Error> {
        let mut session = self.session()?;
        let series = self.series(&mut session).await?;
        Ok(series.nearest(time_seconds).clone())
    }

    async fn estimate(&self, frame: &FrameSample) -> Result<Option<Pose>, Error> {
        let mut inference = self.inference.lock().await;
        let options = EstimateOptions {
            flip_horizontal: self.config.flip_horizontal,
        };
        let start = Instant::now();
        let poses = inference.estimator.estimate(frame, options).await;
        inference.elapsed += start.elapsed();
        Ok(poses?.into_iter().next())
    }

    /// A cached frame together with the best pose detected in it.
    pub async fn show_frame(&self, index: usize) -> Result<(FrameSample, Option<Pose>), Error> {
        let frame = self.frame(index).await?;
        let pose = self.estimate(&frame).await?;
        Ok((frame, pose))
    }

    /// Estimate the pose in frame `index` and keep it as the reference.
    pub async fn select_pose(&self, index: usize) -> Result<SelectedPose, Error> {
        let frame = self.frame(index).await?;
        let pose = self.estimate(&frame).await?.ok_or(Error::NoPose(index))?;
        let selected = SelectedPose {
            frame_index: frame.index,
            timestamp_seconds: frame.timestamp_seconds,
            pose,
            source_frame: frame,
        };
        info!(
            message = "selected reference pose",
            frame = selected.frame_index,
            timestamp = selected.timestamp_seconds
        );
        *self.selected.lock().await = Some(selected.clone());
        Ok(selected)
    }

    pub async fn selected(&self) -> Option<SelectedPose> {
        self.selected.lock().await.clone()
    }

    pub async fn clear_selected(&self) {
        self.selected.lock().await.take();
    }

    /// Score a live frame against the selected reference pose.
    pub async fn compare_live(&self, frame: &FrameSample) -> Result<SimilarityResult, Error> {
        let reference = self.selected().await.ok_or(Error::NoReference)?;
        let current = self.estimate(frame).await?;
        let result = similarity::compare_detected(Some(&reference.pose), current.as_ref());
        debug!(
            message = "compared live pose",
            overall = result.overall,
            joints = result.per_keypoint.len()
        );
        Ok(result)
    }

    pub async fn timing(&self) -> Timing {
        let inference = self.inference.lock().await.elapsed;
        let sampling = self.session.lock().await.sampling;
        Timing {
            inference,
            sampling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{
        config::{EngineConfig, Strategy},
        error::Error,
        estimate::{EstimateOptions, PoseEstimator},
        frame::FrameSample,
        media::{
            fake::{FakeSource, SeekResponse},
            ReadyState,
        },
        pose::{Keypoint, KeypointKind, Pose},
    };
    use assert_approx_eq::assert_approx_eq;
    use std::{sync::Arc, time::Duration};

    /// Detects the same pose in every frame, or nothing.
    struct FixedEstimator(Option<Pose>);

    #[async_trait::async_trait]
    impl PoseEstimator for FixedEstimator {
        async fn estimate(
            &mut self,
            _frame: &FrameSample,
            _options: EstimateOptions,
        ) -> Result<Vec<Pose>, Error> {
            Ok(self.0.iter().cloned().collect())
        }
    }

    fn standing() -> Pose {
        Pose::new(
            vec![
                Keypoint::new(KeypointKind::LeftShoulder, 100.0, 100.0, 0.9),
                Keypoint::new(KeypointKind::RightShoulder, 200.0, 100.0, 0.9),
                Keypoint::new(KeypointKind::LeftHip, 100.0, 200.0, 0.9),
                Keypoint::new(KeypointKind::RightHip, 200.0, 200.0, 0.9),
            ],
            0.9,
        )
        .unwrap()
    }

    fn config(target_count: usize) -> EngineConfig {
        EngineConfig {
            target_count,
            ..EngineConfig::default()
        }
    }

    fn engine(source: FakeSource, pose: Option<Pose>) -> Engine<FakeSource, FixedEstimator> {
        Engine::new(config(5), source, FixedEstimator(pose)).unwrap()
    }

    mod extraction_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn seeks_evenly_across_duration() {
            let engine = engine(FakeSource::new(), None);
            let series = engine.extract().await.unwrap();
            let times: Vec<_> = series
                .frames()
                .iter()
                .map(|frame| frame.timestamp_seconds)
                .collect();
            assert_eq!(times, vec![0.0, 2.0, 4.0, 6.0, 8.0]);

            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.seek_log, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
            assert_eq!(source.reloads, 0);
        }

        #[tokio::test(start_paused = true)]
        async fn never_seeks_to_the_end_of_media() {
            let mut source = FakeSource::new();
            source.silent_at_end = true;
            let engine = engine(source, None);
            let series = engine.extract().await.unwrap();
            assert_eq!(series.len(), 5);
            assert!(engine.timing().await.sampling < Duration::from_secs(5));

            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.reloads, 0);
            assert!(source.seek_log.iter().all(|&target| target < 10.0));
        }

        #[tokio::test(start_paused = true)]
        async fn series_is_cached() {
            let engine = engine(FakeSource::new(), None);
            let first = engine.extract().await.unwrap();
            let second = engine.extract().await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
            engine.frame(3).await.unwrap();
            engine.capture_at(4.0).await.unwrap();

            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.seek_log.len(), 5);
        }

        #[tokio::test(start_paused = true)]
        async fn replacing_the_source_invalidates_the_cache() {
            let engine = engine(FakeSource::new(), None);
            let first = engine.extract().await.unwrap();
            engine.replace_source(FakeSource::new(), false).unwrap();
            let second = engine.extract().await.unwrap();
            assert!(!Arc::ptr_eq(&first, &second));
        }

        #[tokio::test(start_paused = true)]
        async fn fresh_recordings_use_playback() {
            let engine = engine(FakeSource::new(), None);
            engine.replace_source(FakeSource::new(), true).unwrap();
            let series = engine.extract().await.unwrap();
            assert_eq!(series.len(), 5);

            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.reloads, 1);
            assert_eq!(source.seek_log, vec![0.0]);
        }

        #[tokio::test(start_paused = true)]
        async fn unknown_duration_uses_playback() {
            let engine = engine(FakeSource::unbounded(60.0), None);
            let series = engine.extract().await.unwrap();
            assert_eq!(series.len(), 5);
            for pair in series.frames().windows(2) {
                assert!(pair[0].timestamp_seconds <= pair[1].timestamp_seconds);
            }
        }

        #[tokio::test(start_paused = true)]
        async fn configured_playback_strategy() {
            let config = EngineConfig {
                strategy: Strategy::Playback,
                ..config(5)
            };
            let engine = Engine::new(config, FakeSource::new(), FixedEstimator(None)).unwrap();
            engine.extract().await.unwrap();
            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.reloads, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn seek_timeout_falls_back_to_playback() {
            let source = FakeSource::new().with_seeks(&[
                SeekResponse::Immediate,
                SeekResponse::Silent,
                SeekResponse::Silent,
            ]);
            let engine = engine(source, None);
            let series = engine.extract().await.unwrap();
            assert_eq!(series.len(), 5);
            assert_eq!(series.frames()[0].timestamp_seconds, 0.0);

            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.reloads, 1);
            assert_eq!(source.seek_log, vec![0.0, 2.0, 2.01, 0.0]);
            assert!(engine.timing().await.sampling >= Duration::from_secs(8));
        }

        #[tokio::test(start_paused = true)]
        async fn unloaded_source_is_reset_before_seeking() {
            let mut source = FakeSource::new();
            source.ready = ReadyState::Nothing;
            let engine = engine(source, None);
            engine.extract().await.unwrap();
            let source = engine.replace_source(FakeSource::new(), false).unwrap();
            assert_eq!(source.reloads, 1);
            assert_eq!(source.seek_log.len(), 5);
        }

        #[tokio::test(start_paused = true)]
        async fn concurrent_sampling_is_rejected() {
            let engine = engine(FakeSource::new(), None);
            let (first, second) = tokio::join!(engine.extract(), engine.extract());
            assert!(first.is_ok());
            assert!(matches!(second, Err(Error::Busy)));
        }

        #[tokio::test(start_paused = true)]
        async fn out_of_range_frame() {
            let engine = engine(FakeSource::new(), None);
            assert!(matches!(
                engine.frame(5).await,
                Err(Error::FrameOutOfRange { index: 5, len: 5 })
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn capture_at_serves_nearest_cached_frame() {
            let engine = engine(FakeSource::new(), None);
            let frame = engine.capture_at(6.9).await.unwrap();
            assert_eq!(frame.index, 3);
            assert_eq!(frame.timestamp_seconds, 6.0);
        }
    }

    mod selection_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn select_and_compare() {
            let engine = engine(FakeSource::new(), Some(standing()));
            let selected = engine.select_pose(1).await.unwrap();
            assert_eq!(selected.frame_index, 1);
            assert_eq!(selected.timestamp_seconds, 2.0);
            assert_eq!(selected.source_frame.image, b"frame@2.000".to_vec());
            assert_eq!(engine.selected().await, Some(selected));

            let live = FrameSample::new(0, 0.0, Vec::new());
            let result = engine.compare_live(&live).await.unwrap();
            assert_approx_eq!(result.overall, 100.0);
        }

        #[tokio::test(start_paused = true)]
        async fn no_pose_to_select() {
            let engine = engine(FakeSource::new(), None);
            assert!(matches!(engine.select_pose(0).await, Err(Error::NoPose(0))));
            assert_eq!(engine.selected().await, None);
        }

        #[tokio::test(start_paused = true)]
        async fn comparing_without_reference() {
            let engine = engine(FakeSource::new(), Some(standing()));
            let live = FrameSample::new(0, 0.0, Vec::new());
            assert!(matches!(
                engine.compare_live(&live).await,
                Err(Error::NoReference)
            ));

            engine.select_pose(0).await.unwrap();
            engine.clear_selected().await;
            assert!(matches!(
                engine.compare_live(&live).await,
                Err(Error::NoReference)
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn show_frame_includes_pose() {
            let engine = engine(FakeSource::new(), Some(standing()));
            let (frame, pose) = engine.show_frame(4).await.unwrap();
            assert_eq!(frame.timestamp_seconds, 8.0);
            assert_eq!(pose, Some(standing()));
        }

        #[tokio::test(start_paused = true)]
        async fn selection_survives_new_recording() {
            let engine = engine(FakeSource::new(), Some(standing()));
            engine.select_pose(2).await.unwrap();
            engine.replace_source(FakeSource::new(), true).unwrap();
            assert!(engine.selected().await.is_some());
        }
    }
}
