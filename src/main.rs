use anyhow::{Context, Result};
use pose_match::{similarity, Pose};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;

#[cfg(feature = "video")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "video")]
use pose_match::{
    media::video_file::VideoFile, sampler::Progress, Engine, EngineConfig, PoseTrack,
};
#[cfg(feature = "video")]
use std::sync::Arc;

#[derive(structopt::StructOpt)]
enum Command {
    /// Score a pose against a reference pose, both stored as JSON.
    Compare {
        reference: PathBuf,
        current: PathBuf,
    },

    /// Extract a frame series from a video and write the frames as JPEGs.
    #[cfg(feature = "video")]
    Extract {
        video: PathBuf,

        #[structopt(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Treat the video as a fresh recording whose seeks are unreliable.
        #[structopt(long)]
        fresh: bool,

        #[structopt(short, long)]
        show_progress: bool,

        #[structopt(flatten)]
        config: EngineConfig,
    },

    /// Pick the reference pose from one frame of a video.
    #[cfg(feature = "video")]
    Select {
        video: PathBuf,

        /// Poses estimated for the video, keyed by frame timestamp.
        #[structopt(short, long)]
        poses: PathBuf,

        /// Index of the frame in the extracted series.
        #[structopt(short, long)]
        index: usize,

        /// Where to write the selected pose. Defaults to stdout.
        #[structopt(short, long)]
        out: Option<PathBuf>,

        #[structopt(short, long)]
        show_progress: bool,

        #[structopt(flatten)]
        config: EngineConfig,
    },
}

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(subcommand)]
    command: Command,
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn read_pose(path: &Path) -> Result<Pose> {
    serde_json::from_reader(open(path)?)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn compare(reference: &Path, current: &Path) -> Result<()> {
    let reference = read_pose(reference)?;
    let current = Pose::detected_from_reader(open(current)?);
    let result = similarity::compare_detected(Some(&reference), current.as_ref());

    info!(
        message = "compared poses",
        overall = result.overall,
        grade = result.grade().label()
    );
    for joint in result.needs_adjustment() {
        info!(
            message = "needs adjustment",
            joint = joint.kind.label(),
            similarity = joint.similarity
        );
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(feature = "video")]
fn progress_bar(show_progress: bool) -> Option<ProgressBar> {
    if show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    }
}

#[cfg(feature = "video")]
fn engine<E>(
    config: EngineConfig,
    video: &Path,
    fresh: bool,
    estimator: E,
    pb: Option<&ProgressBar>,
) -> Result<Engine<VideoFile, E>>
where
    E: pose_match::PoseEstimator,
{
    let source = VideoFile::open(video).context("failed opening video")?;
    let engine = Engine::new(config, source, estimator)
        .context("failed constructing engine")?
        .fresh(fresh);
    Ok(match pb.cloned() {
        Some(pb) => engine.with_progress(Arc::new(move |progress: Progress| {
            pb.set_message(format!(
                "{}/{} frames ({}%)",
                progress.captured,
                progress.target,
                progress.percent()
            ));
            pb.tick();
        })),
        None => engine,
    })
}

/// Resolves once Ctrl-C is pressed.
#[cfg(feature = "video")]
async fn interrupted(mut rx: tokio::sync::watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(opt.log_level),
    )?;

    #[cfg(feature = "video")]
    let rx = {
        let (tx, rx) = tokio::sync::watch::channel(false);
        ctrlc::set_handler(move || {
            let _ = tx.send(true);
        })
        .context("failed setting Ctrl-C handler")?;
        rx
    };

    match opt.command {
        Command::Compare { reference, current } => compare(&reference, &current),

        #[cfg(feature = "video")]
        Command::Extract {
            video,
            out_dir,
            fresh,
            show_progress,
            config,
        } => {
            let pb = progress_bar(show_progress);
            let engine = engine(config, &video, fresh, PoseTrack::default(), pb.as_ref())?;

            let series = tokio::select! {
                series = engine.extract() => series.context("failed extracting frames")?,
                _ = interrupted(rx) => anyhow::bail!("interrupted"),
            };
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed creating {}", out_dir.display()))?;
            for frame in series.frames() {
                let path = out_dir.join(format!("frame_{:03}.jpg", frame.index));
                std::fs::write(&path, &frame.image)
                    .with_context(|| format!("failed writing {}", path.display()))?;
            }
            let index = File::create(out_dir.join("frames.json"))
                .context("failed creating frame index")?;
            serde_json::to_writer_pretty(index, series.frames())?;

            let timing = engine.timing().await;
            info!(
                message = "wrote frames",
                frames = series.len(),
                out_dir = %out_dir.display(),
                sampling = ?timing.sampling
            );
            Ok(())
        }

        #[cfg(feature = "video")]
        Command::Select {
            video,
            poses,
            index,
            out,
            show_progress,
            config,
        } => {
            let track = PoseTrack::from_path(&poses).context("failed loading poses")?;
            let pb = progress_bar(show_progress);
            let engine = engine(config, &video, false, track, pb.as_ref())?;

            let selected = tokio::select! {
                selected = engine.select_pose(index) => selected.context("failed selecting pose")?,
                _ = interrupted(rx) => anyhow::bail!("interrupted"),
            };
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match out {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("failed creating {}", path.display()))?;
                    serde_json::to_writer_pretty(file, &selected)?;
                }
                None => println!("{}", serde_json::to_string_pretty(&selected)?),
            }

            let timing = engine.timing().await;
            info!(
                message = "selected pose",
                frame = selected.frame_index,
                timestamp = selected.timestamp_seconds,
                inference = ?timing.inference,
                sampling = ?timing.sampling
            );
            Ok(())
        }
    }
}
