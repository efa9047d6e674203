//! Clip renderer: one slide in, one standalone clip out.

use std::path::PathBuf;
use std::sync::Arc;

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_project_model::slide::Slide;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifacts::TempLayout;
use crate::audio::{normalise, secs, AudioPlan, AudioTrim, SAMPLE_RATE};
use crate::encoder::{run_and_probe, Encoder, EncoderJob, MediaInput};
use crate::filter_graph::{Filter, FilterChain, FilterGraph};
use crate::motion::{compile_motion, Resolution, MOTION_FPS};

/// A rendered slide.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedClip {
    /// Position in the slideshow.
    pub index: usize,
    /// Slide count; only used for naming.
    pub total: usize,
    pub path: PathBuf,
    /// Declared display duration, seconds.
    pub expected_secs: f64,
    /// Measured duration, seconds.
    pub duration_secs: f64,
    pub audio_duration_secs: Option<f64>,
}

/// Build the encoder job for slide `index` of `total`.
///
/// The clip carries the slide's audio fragment, or silence, so every clip
/// has an audio stream the compositor can crossfade.
pub fn clip_job(
    slide: &Slide,
    index: usize,
    total: usize,
    trim: Option<&AudioTrim>,
    layout: &TempLayout,
    resolution: Resolution,
) -> StoryreelResult<EncoderJob> {
    let duration_ms = slide.effective_duration_ms();
    let motion = compile_motion(&slide.motion, duration_ms, resolution)?;

    let mut video = FilterChain::new().input("0:v");
    for filter in motion {
        video = video.filter(filter);
    }
    video = video
        .filter(Filter::new("format").arg("yuv420p"))
        .output("v");

    let (audio_input, audio) = match trim {
        Some(trim) => (
            MediaInput::file(&trim.source),
            FilterChain::new()
                .input("1:a")
                .filter(
                    Filter::new("atrim")
                        .opt("start", secs(trim.start_secs))
                        .opt("duration", secs(trim.duration_secs)),
                )
                .filter(Filter::new("asetpts").arg("PTS-STARTPTS"))
                .filter(normalise())
                .filter(Filter::new("apad")),
        ),
        None => (
            MediaInput::lavfi(format!("anullsrc=r={SAMPLE_RATE}:cl=stereo")),
            FilterChain::new().input("1:a").filter(normalise()),
        ),
    };

    Ok(EncoderJob::new(
        format!("clip {index}"),
        layout.clip(index, total),
    )
    .input(MediaInput::looped_image(&slide.image, duration_ms))
    .input(audio_input)
    .filter_graph(FilterGraph::new().chain(video).chain(audio.output("a")))
    .options(vec![
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-t".to_string(),
        format!("{duration_ms}ms"),
        "-r".to_string(),
        MOTION_FPS.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
    ])
    .expect_duration(f64::from(duration_ms) / 1000.0))
}

/// Render every slide, at most `limiter`'s permit count at a time.
///
/// Each slide is rendered exactly once. The first failure aborts the
/// remaining work. Clips are returned in slide order. `on_clip` is called
/// with the number finished so far.
pub async fn render_clips(
    slides: &[Slide],
    encoder: Arc<dyn Encoder>,
    limiter: Arc<Semaphore>,
    layout: &TempLayout,
    resolution: Resolution,
    mut on_clip: impl FnMut(usize),
) -> StoryreelResult<Vec<RenderedClip>> {
    let total = slides.len();
    let plan = AudioPlan::build(slides);

    // Build every job first so malformed input fails before any encoding.
    let jobs = slides
        .iter()
        .enumerate()
        .map(|(i, slide)| {
            clip_job(slide, i, total, plan.trims[i].as_ref(), layout, resolution)
                .map(|job| (i, slide.effective_duration_ms(), job))
        })
        .collect::<StoryreelResult<Vec<_>>>()?;

    tracing::info!(clips = total, "Rendering clips");

    let mut tasks = JoinSet::new();
    for (index, duration_ms, job) in jobs {
        let encoder = encoder.clone();
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let produced = run_and_probe(encoder, limiter, job).await?;
            tracing::debug!(
                index,
                duration_secs = produced.duration_secs,
                "Clip rendered"
            );
            Ok::<_, StoryreelError>(RenderedClip {
                index,
                total,
                path: produced.path,
                expected_secs: f64::from(duration_ms) / 1000.0,
                duration_secs: produced.duration_secs,
                audio_duration_secs: produced.audio_duration_secs,
            })
        });
    }

    let mut clips: Vec<Option<RenderedClip>> = vec![None; total];
    let mut finished = 0;
    while let Some(joined) = tasks.join_next().await {
        let clip = match joined {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(StoryreelError::render(format!("Clip task failed: {e}")));
            }
        };
        finished += 1;
        on_clip(finished);
        let slot = clip.index;
        clips[slot] = Some(clip);
    }

    clips
        .into_iter()
        .enumerate()
        .map(|(i, clip)| {
            clip.ok_or_else(|| StoryreelError::render(format!("Clip {i} was never rendered")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::DryRunEncoder;
    use storyreel_project_model::slide::AudioTrackRef;

    fn slide(duration_ms: u32) -> Slide {
        let mut s = Slide::new(format!("/img/{duration_ms}.jpg"));
        s.display_duration_ms = Some(duration_ms);
        s
    }

    #[test]
    fn test_clip_job_with_audio() {
        let mut s = slide(9400);
        s.audio_tracks.push(AudioTrackRef::narration("/audio/n1.mp3"));
        let plan = AudioPlan::build(std::slice::from_ref(&s));
        let layout = TempLayout::new("/tmp/sr");

        let job = clip_job(&s, 0, 3, plan.trims[0].as_ref(), &layout, Resolution::HD).unwrap();
        let args = job.to_args().unwrap();
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];

        assert!(graph.starts_with("[0:v]scale=8000:-1,zoompan="));
        assert!(graph.contains("d=235:fps=25,scale=1280:720,setsar=1:1,format=yuv420p[v]"));
        assert!(graph.contains("[1:a]atrim=start=0.000:duration=9.400,asetpts=PTS-STARTPTS"));
        assert!(args.contains(&"/audio/n1.mp3".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "9400ms"));
        assert_eq!(args.last().unwrap(), "/tmp/sr/temp0-3.mp4");
        assert_eq!(job.expected_duration_secs, Some(9.4));
    }

    #[test]
    fn test_clip_job_without_audio_uses_silence() {
        let s = slide(5000);
        let job = clip_job(&s, 1, 2, None, &TempLayout::new("/tmp/sr"), Resolution::LOW).unwrap();
        let args = job.to_args().unwrap();
        assert!(args.contains(&"anullsrc=r=44100:cl=stereo".to_string()));
        assert!(args.iter().any(|a| a.contains("scale=852:480")));
    }

    #[test]
    fn test_zero_duration_fails_before_encoding() {
        let s = slide(0);
        let result = clip_job(&s, 0, 1, None, &TempLayout::new("/tmp/sr"), Resolution::HD);
        assert!(matches!(result, Err(StoryreelError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_render_clips_in_order_with_bounded_pool() {
        let slides: Vec<Slide> = (1..=5).map(|i| slide(i * 1000)).collect();
        let encoder = Arc::new(DryRunEncoder::new());
        let limiter = Arc::new(Semaphore::new(2));
        let layout = TempLayout::new("/tmp/sr-clips");

        let mut progress = vec![];
        let clips = render_clips(
            &slides,
            encoder.clone(),
            limiter,
            &layout,
            Resolution::HD,
            |n| progress.push(n),
        )
        .await
        .unwrap();

        assert_eq!(clips.len(), 5);
        for (i, clip) in clips.iter().enumerate() {
            assert_eq!(clip.index, i);
            assert_eq!(clip.path, layout.clip(i, 5));
            assert!((clip.duration_secs - (i as f64 + 1.0)).abs() < 1e-9);
        }
        assert_eq!(progress, vec![1, 2, 3, 4, 5]);
        assert_eq!(encoder.jobs().len(), 5);
    }
}
