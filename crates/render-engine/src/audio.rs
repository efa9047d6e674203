//! Audio synchronizer.
//!
//! Builds one audio timeline from the slides' primary tracks, independent
//! of how many slides reuse a file, and fits it to the composed picture:
//!
//! 1. drop the audio of the root composite (`video_with_no_audio.mp4`)
//! 2. mux the concatenated per-slide fragments (`merged_video.mp4`)
//! 3. trim the result to the silent video's measured length (`final.mp4`)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use storyreel_common::clock::ms_to_secs;
use storyreel_common::error::StoryreelResult;
use storyreel_project_model::slide::Slide;
use tokio::sync::Semaphore;

use crate::artifacts::TempLayout;
use crate::encoder::{run_and_probe, Encoder, EncoderJob, MediaInput, ProducedArtifact};
use crate::filter_graph::{Filter, FilterChain, FilterGraph};

/// Sample rate every fragment is normalised to.
pub const SAMPLE_RATE: u32 = 44_100;

/// The part of a source file heard during one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrim {
    pub source: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// One source file and the slides it plays over.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub source: PathBuf,
    /// Slide indices in order.
    pub slides: Vec<usize>,
}

impl AudioSegment {
    pub fn first_slide(&self) -> usize {
        self.slides.first().copied().unwrap_or_default()
    }

    pub fn last_slide(&self) -> usize {
        self.slides.last().copied().unwrap_or_default()
    }
}

/// Per-slide trims plus the distinct sources they come from.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPlan {
    /// Indexed by slide; `None` means silence.
    pub trims: Vec<Option<AudioTrim>>,
    /// Distinct sources in order of first appearance.
    pub segments: Vec<AudioSegment>,
    /// Display duration of every slide, seconds.
    pub slide_secs: Vec<f64>,
}

impl AudioPlan {
    /// Plan the audio of `slides`.
    ///
    /// A slide's fragment starts where the previous slides using the same
    /// file left off, so a background track spanning several slides plays
    /// continuously instead of restarting.
    pub fn build(slides: &[Slide]) -> Self {
        let mut trims = Vec::with_capacity(slides.len());
        let mut segments: Vec<AudioSegment> = vec![];
        let mut consumed_ms: HashMap<PathBuf, u64> = HashMap::new();
        let mut slide_secs = Vec::with_capacity(slides.len());

        for (i, slide) in slides.iter().enumerate() {
            let duration_ms = slide.effective_duration_ms();
            slide_secs.push(ms_to_secs(duration_ms));

            let Some(track) = slide.primary_audio() else {
                trims.push(None);
                continue;
            };

            let used = consumed_ms.entry(track.path.clone()).or_insert(0);
            trims.push(Some(AudioTrim {
                source: track.path.clone(),
                start_secs: *used as f64 / 1000.0,
                duration_secs: ms_to_secs(duration_ms),
            }));
            *used += u64::from(duration_ms);

            match segments.iter_mut().find(|s| s.source == track.path) {
                Some(segment) => segment.slides.push(i),
                None => segments.push(AudioSegment {
                    source: track.path.clone(),
                    slides: vec![i],
                }),
            }
        }

        Self {
            trims,
            segments,
            slide_secs,
        }
    }

    /// Length of the concatenated track.
    pub fn total_secs(&self) -> f64 {
        self.slide_secs.iter().sum()
    }

    pub fn is_silent(&self) -> bool {
        self.segments.is_empty()
    }

    /// Filter graph producing `[a]` from the sources, which must be inputs
    /// `first_input`, `first_input + 1`, ... in segment order.
    pub fn timeline_graph(&self, first_input: usize) -> FilterGraph {
        let mut graph = FilterGraph::new();

        // Fan each source out to one pad per slide using it.
        let mut pads: HashMap<usize, String> = HashMap::new();
        for (s, segment) in self.segments.iter().enumerate() {
            let stream = format!("{}:a", first_input + s);
            if segment.slides.len() == 1 {
                pads.insert(segment.first_slide(), stream);
                continue;
            }
            let mut split = FilterChain::new()
                .input(stream)
                .filter(Filter::new("asplit").arg(segment.slides.len()));
            for &slide in &segment.slides {
                let label = format!("src{s}_{slide}");
                split = split.output(label.clone());
                pads.insert(slide, label);
            }
            graph.push(split);
        }

        let mut concat = FilterChain::new();
        for (i, trim) in self.trims.iter().enumerate() {
            let label = format!("a{i}");
            let chain = match (trim, pads.remove(&i)) {
                (Some(trim), Some(pad)) => FilterChain::new()
                    .input(pad)
                    .filter(
                        Filter::new("atrim")
                            .opt("start", secs(trim.start_secs))
                            .opt("duration", secs(trim.duration_secs)),
                    )
                    .filter(Filter::new("asetpts").arg("PTS-STARTPTS"))
                    .filter(normalise())
                    .filter(Filter::new("apad"))
                    .filter(Filter::new("atrim").opt("duration", secs(trim.duration_secs))),
                _ => FilterChain::new()
                    .filter(
                        Filter::new("anullsrc")
                            .opt("r", SAMPLE_RATE)
                            .opt("cl", "stereo"),
                    )
                    .filter(Filter::new("atrim").opt("duration", secs(self.slide_secs[i]))),
            };
            graph.push(chain.output(label.clone()));
            concat = concat.input(label);
        }

        graph.chain(
            concat
                .filter(
                    Filter::new("concat")
                        .opt("n", self.trims.len())
                        .opt("v", 0)
                        .opt("a", 1),
                )
                .output("a"),
        )
    }
}

/// `aformat` to 44.1 kHz stereo.
pub(crate) fn normalise() -> Filter {
    Filter::new("aformat")
        .opt("sample_rates", SAMPLE_RATE)
        .opt("channel_layouts", "stereo")
}

pub(crate) fn secs(value: f64) -> String {
    format!("{value:.3}")
}

/// Result of audio synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedVideo {
    /// The trimmed, muxed video (`final.mp4`).
    pub path: PathBuf,
    /// Measured length of the silent composite the output was trimmed to.
    pub duration_secs: f64,
}

/// Step 1: the root composite without its audio stream.
pub fn silent_video_job(layout: &TempLayout, composite: &ProducedArtifact) -> EncoderJob {
    EncoderJob::new("extract silent video", layout.silent_composite())
        .input(MediaInput::file(&composite.path))
        .options(["-map", "0:v", "-c:v", "copy", "-an"])
        .expect_duration(composite.duration_secs)
}

/// Step 2: silent video plus the planned audio timeline.
pub fn mux_job(layout: &TempLayout, plan: &AudioPlan, silent: &ProducedArtifact) -> EncoderJob {
    let mut job = EncoderJob::new("mux audio", layout.muxed())
        .input(MediaInput::file(&silent.path));
    for segment in &plan.segments {
        job = job.input(MediaInput::file(&segment.source));
    }
    job.filter_graph(plan.timeline_graph(1))
        .options([
            "-map", "0:v", "-map", "[a]", "-codec:v", "copy", "-codec:a", "libmp3lame",
        ])
        .expect_duration(silent.duration_secs.max(plan.total_secs()))
}

/// Step 3: cut the muxed video to the picture's length.
pub fn trim_job(layout: &TempLayout, muxed: &ProducedArtifact, duration_secs: f64) -> EncoderJob {
    EncoderJob::new("trim to picture", layout.trimmed())
        .input(MediaInput::file(&muxed.path))
        .options(vec![
            "-c".to_string(),
            "copy".to_string(),
            "-t".to_string(),
            format!("{duration_secs:.6}"),
        ])
        .expect_duration(duration_secs)
}

/// Run the three synchronization steps against the root composite.
pub async fn synchronize_audio(
    encoder: Arc<dyn Encoder>,
    limiter: Arc<Semaphore>,
    layout: &TempLayout,
    slides: &[Slide],
    composite: &ProducedArtifact,
    mut on_step: impl FnMut(usize),
) -> StoryreelResult<SyncedVideo> {
    let plan = AudioPlan::build(slides);
    tracing::info!(
        sources = plan.segments.len(),
        silent_slides = plan.trims.iter().filter(|t| t.is_none()).count(),
        "Synchronizing audio"
    );

    let silent = run_and_probe(
        encoder.clone(),
        limiter.clone(),
        silent_video_job(layout, composite),
    )
    .await?;
    on_step(1);

    let muxed = run_and_probe(encoder.clone(), limiter.clone(), mux_job(layout, &plan, &silent)).await?;
    on_step(2);

    if muxed.duration_secs > silent.duration_secs {
        tracing::debug!(
            excess_secs = muxed.duration_secs - silent.duration_secs,
            "Trimming audio past the end of the picture"
        );
    }
    let trimmed = run_and_probe(
        encoder,
        limiter,
        trim_job(layout, &muxed, silent.duration_secs),
    )
    .await?;
    on_step(3);

    Ok(SyncedVideo {
        path: trimmed.path,
        duration_secs: silent.duration_secs,
    })
}
