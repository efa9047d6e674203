//! Render jobs and the orchestration of a full render.

use std::path::PathBuf;
use std::sync::Arc;

use storyreel_common::clock::RenderClock;
use storyreel_common::config::RenderDefaults;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_project_model::slideshow::Slideshow;
use tokio::sync::Semaphore;

use crate::artifacts::{output_path, TempLayout};
use crate::audio::synchronize_audio;
use crate::clip::render_clips;
use crate::encoder::{run_and_probe, Encoder, EncoderJob, MediaInput};
use crate::merge::{composite, MergeContext};
use crate::motion::Resolution;
use crate::progress::{report, ProgressCallback, RenderStage};
use crate::strategy::{composition_for, select_strategy, EncoderVersion, RenderStrategy};

/// A render job ready to run.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub slideshow: Slideshow,

    /// Directory receiving `<slideshow name>.mp4`.
    pub output_dir: PathBuf,

    /// Temp directory; a fresh one under the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,

    pub resolution: Resolution,

    /// Use the legacy composition whatever the encoder version.
    pub force_legacy: bool,

    /// Keep the temp directory after a successful render.
    pub keep_temps: bool,

    /// Upper bound on concurrent encoder processes.
    pub max_parallel_jobs: usize,

    pub drift_tolerance_secs: f64,
}

impl RenderJob {
    /// A job writing to the current directory with default settings.
    pub fn new(slideshow: Slideshow) -> Self {
        Self::with_defaults(slideshow, &RenderDefaults::default())
    }

    pub fn with_defaults(slideshow: Slideshow, defaults: &RenderDefaults) -> Self {
        Self {
            slideshow,
            output_dir: PathBuf::from("."),
            temp_dir: None,
            resolution: Resolution::for_quality(defaults.low_quality),
            force_legacy: false,
            keep_temps: defaults.keep_temps,
            max_parallel_jobs: defaults.max_parallel_jobs.max(1),
            drift_tolerance_secs: defaults.drift_tolerance_secs,
        }
    }

    /// Where the finished video is written.
    pub fn output_path(&self) -> PathBuf {
        output_path(&self.output_dir, &self.slideshow.name)
    }
}

/// What a finished render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub output_path: PathBuf,
    pub strategy: RenderStrategy,
    pub encoder_version: EncoderVersion,
    pub clips: usize,
    pub merges: usize,
    pub tree_height: usize,
    /// Measured length of the root composite, before the final trim.
    pub composed_duration_secs: f64,
    /// Measured length of the published video.
    pub final_duration_secs: f64,
    /// Set when temporaries were kept.
    pub temp_dir: Option<PathBuf>,
    pub elapsed_secs: f64,
}

/// Render a slideshow to a single video.
///
/// Validates the slideshow, selects a strategy, renders every clip, merges
/// them, synchronizes audio and publishes the result. On failure the temp
/// directory is left in place for inspection.
pub async fn render_slideshow(
    job: RenderJob,
    encoder: Arc<dyn Encoder>,
    progress: Option<ProgressCallback>,
) -> StoryreelResult<RenderSummary> {
    let clock = RenderClock::start();
    let total = job.slideshow.len();
    tracing::info!(
        slideshow = %job.slideshow.name,
        slides = total,
        encoder = encoder.name(),
        resolution = %job.resolution,
        output = %job.output_path().display(),
        "Starting render"
    );

    job.slideshow.ensure_renderable()?;

    report(progress.as_ref(), RenderStage::Probing, 0, 1);
    let (strategy, encoder_version) = {
        let encoder = encoder.clone();
        let force_legacy = job.force_legacy;
        tokio::task::spawn_blocking(move || select_strategy(encoder.as_ref(), force_legacy))
            .await
            .map_err(|e| StoryreelError::render(format!("Version probe failed: {e}")))??
    };
    report(progress.as_ref(), RenderStage::Probing, 1, 1);

    let layout = match &job.temp_dir {
        Some(dir) => TempLayout::new(dir),
        None => TempLayout::unique(&clock),
    };
    layout.create()?;
    std::fs::create_dir_all(&job.output_dir)?;
    tracing::debug!(temp_dir = %layout.root().display(), "Using temp directory");

    let limiter = Arc::new(Semaphore::new(job.max_parallel_jobs.max(1)));
    let slides = Arc::new(job.slideshow.slides.clone());

    report(progress.as_ref(), RenderStage::RenderingClips, 0, total);
    let clips = render_clips(
        &slides,
        encoder.clone(),
        limiter.clone(),
        &layout,
        job.resolution,
        |done| report(progress.as_ref(), RenderStage::RenderingClips, done, total),
    )
    .await?;

    let merges_total = total.saturating_sub(1);
    report(progress.as_ref(), RenderStage::Compositing, 0, merges_total);
    let mut ctx = MergeContext::new(
        encoder.clone(),
        limiter.clone(),
        composition_for(strategy),
        slides.clone(),
        layout.clone(),
        job.resolution,
        job.drift_tolerance_secs,
    );
    if let Some(cb) = progress.clone() {
        ctx = ctx.on_merge(move |done| {
            report(Some(&cb), RenderStage::Compositing, done, merges_total)
        });
    }
    let tree = composite(Arc::new(ctx), clips).await?;
    tracing::info!(
        merges = tree.merges,
        height = tree.height,
        duration_secs = tree.root.duration_secs,
        "Merge tree complete"
    );

    report(progress.as_ref(), RenderStage::SyncingAudio, 0, 3);
    let synced = synchronize_audio(
        encoder.clone(),
        limiter.clone(),
        &layout,
        &slides,
        &tree.root.artifact(),
        |step| report(progress.as_ref(), RenderStage::SyncingAudio, step, 3),
    )
    .await?;

    report(progress.as_ref(), RenderStage::Finalizing, 0, 1);
    let output = job.output_path();
    let publish = EncoderJob::new("publish", &output)
        .input(MediaInput::file(&synced.path))
        .options(["-c", "copy"])
        .expect_duration(synced.duration_secs);
    let published = run_and_probe(encoder, limiter, publish).await?;

    let temp_dir = if job.keep_temps {
        tracing::info!(temp_dir = %layout.root().display(), "Keeping temporary files");
        Some(layout.root().to_path_buf())
    } else {
        if let Err(e) = layout.remove() {
            tracing::warn!(
                error = %e,
                temp_dir = %layout.root().display(),
                "Failed to remove temporary files"
            );
        }
        None
    };
    report(progress.as_ref(), RenderStage::Complete, 1, 1);

    let summary = RenderSummary {
        output_path: output,
        strategy,
        encoder_version,
        clips: total,
        merges: tree.merges,
        tree_height: tree.height,
        composed_duration_secs: tree.root.duration_secs,
        final_duration_secs: published.duration_secs,
        temp_dir,
        elapsed_secs: clock.elapsed_secs(),
    };
    tracing::info!(
        output = %summary.output_path.display(),
        duration_secs = summary.final_duration_secs,
        elapsed_secs = summary.elapsed_secs,
        "Render finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_project_model::slide::Slide;

    #[test]
    fn test_job_defaults() {
        let job = RenderJob::new(Slideshow::new("Story", vec![Slide::new("a.jpg")]));
        assert_eq!(job.output_path(), PathBuf::from("./Story.mp4"));
        assert_eq!(job.resolution, Resolution::HD);
        assert!(job.max_parallel_jobs >= 1);
        assert!(!job.keep_temps);
    }

    #[test]
    fn test_low_quality_defaults() {
        let defaults = RenderDefaults {
            low_quality: true,
            max_parallel_jobs: 0,
            ..RenderDefaults::default()
        };
        let job = RenderJob::with_defaults(Slideshow::new("s", vec![]), &defaults);
        assert_eq!(job.resolution, Resolution::LOW);
        assert_eq!(job.max_parallel_jobs, 1);
    }

    #[tokio::test]
    async fn test_invalid_slideshow_fails_before_encoding() {
        let encoder = Arc::new(crate::dry_run::DryRunEncoder::new());
        let job = RenderJob::new(Slideshow::new("empty", vec![]));
        let result = render_slideshow(job, encoder.clone(), None).await;
        assert!(matches!(result, Err(StoryreelError::Validation { .. })));
        assert!(encoder.jobs().is_empty());
    }
}
