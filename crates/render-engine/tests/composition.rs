use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio::sync::Semaphore;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_project_model::slide::{AudioTrackRef, Slide, Transition};
use storyreel_project_model::slideshow::Slideshow;
use storyreel_render_engine::dry_run::DryRunEncoder;
use storyreel_render_engine::encoder::{Encoder, EncoderJob};
use storyreel_render_engine::artifacts::TempLayout;
use storyreel_render_engine::clip::render_clips;
use storyreel_render_engine::merge::{composite, crossfade_offset, MergeContext};
use storyreel_render_engine::motion::Resolution;
use storyreel_render_engine::strategy::composition_for;
use storyreel_render_engine::{
    render_slideshow, ProgressCallback, RenderJob, RenderProgress, RenderStage, RenderStrategy,
};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "storyreel_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

/// A slideshow of `count` slides whose images exist under `dir`.
fn fixture(dir: &Path, count: usize, duration_ms: u32, transition_ms: u32) -> Slideshow {
    std::fs::create_dir_all(dir).unwrap();
    let slides = (0..count)
        .map(|i| {
            let image = dir.join(format!("slide{i}.jpg"));
            std::fs::write(&image, b"jpg").unwrap();
            let mut slide = Slide::new(image);
            slide.display_duration_ms = Some(duration_ms);
            slide.transition = Transition::new("fade", transition_ms);
            slide
        })
        .collect();
    Slideshow::new("story", slides)
}

fn job_for(show: Slideshow, root: &Path) -> RenderJob {
    let mut job = RenderJob::new(show);
    job.output_dir = root.join("out");
    job.temp_dir = Some(root.join("tmp"));
    job.max_parallel_jobs = 3;
    job
}

fn merge_outputs(encoder: &DryRunEncoder) -> Vec<PathBuf> {
    encoder
        .jobs()
        .into_iter()
        .filter(|j| j.label.starts_with("merge"))
        .map(|j| j.output)
        .collect()
}

#[tokio::test]
async fn eight_slides_compose_with_crossfade() {
    let root = temp_dir("eight_slides");
    let job = job_for(fixture(&root, 8, 5000, 1000), &root);
    let encoder = Arc::new(DryRunEncoder::new());

    let summary = render_slideshow(job, encoder.clone(), None).await.unwrap();

    assert_eq!(summary.strategy, RenderStrategy::Modern);
    assert_eq!(summary.clips, 8);
    assert_eq!(summary.merges, 7);
    assert_eq!(summary.tree_height, 3);
    assert!((summary.composed_duration_secs - 33.0).abs() < 1e-6);
    assert!((summary.final_duration_secs - 33.0).abs() < 1e-6);
    assert_eq!(summary.output_path, root.join("out").join("story.mp4"));

    let merges = merge_outputs(&encoder);
    assert_eq!(merges.len(), 7);
    let unique: HashSet<_> = merges.iter().collect();
    assert_eq!(unique.len(), 7);
    assert!(merges.contains(&root.join("tmp").join("merged0-0.mp4")));

    let jobs = encoder.jobs();
    let merge_args = &jobs.iter().find(|j| j.label.starts_with("merge")).unwrap().args;
    assert!(merge_args.iter().any(|a| a.contains("xfade=transition=fade:duration=1.000")));

    let publish = jobs.last().unwrap();
    assert_eq!(publish.label, "publish");
    assert_eq!(publish.output, summary.output_path);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn legacy_fade_is_forced_by_flag() {
    let root = temp_dir("legacy_flag");
    let mut job = job_for(fixture(&root, 3, 2000, 500), &root);
    job.force_legacy = true;
    let encoder = Arc::new(DryRunEncoder::new());

    let summary = render_slideshow(job, encoder.clone(), None).await.unwrap();

    assert_eq!(summary.strategy, RenderStrategy::Legacy);
    let jobs = encoder.jobs();
    let merge = jobs.iter().find(|j| j.label.starts_with("merge")).unwrap();
    let graph = merge.args.iter().find(|a| a.contains("overlay")).unwrap();
    assert!(graph.contains("fade=t=in:st=0:d=0.500:alpha=1"));
    assert!(!graph.contains("xfade"));

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn old_encoder_selects_legacy_fade() {
    let root = temp_dir("legacy_banner");
    let job = job_for(fixture(&root, 2, 3000, 1000), &root);
    let encoder = Arc::new(
        DryRunEncoder::new().with_banner("ffmpeg version 4.2.7-0ubuntu0.1 Copyright (c) 2000-2022"),
    );

    let summary = render_slideshow(job, encoder, None).await.unwrap();
    assert_eq!(summary.strategy, RenderStrategy::Legacy);
    assert_eq!(summary.encoder_version.to_string(), "4.2.7");
    assert!((summary.composed_duration_secs - 5.0).abs() < 1e-6);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn single_slide_needs_no_merge() {
    let root = temp_dir("single_slide");
    let job = job_for(fixture(&root, 1, 4000, 1000), &root);
    let encoder = Arc::new(DryRunEncoder::new());

    let summary = render_slideshow(job, encoder.clone(), None).await.unwrap();
    assert_eq!(summary.merges, 0);
    assert_eq!(summary.tree_height, 0);
    assert!((summary.final_duration_secs - 4.0).abs() < 1e-6);
    assert!(merge_outputs(&encoder).is_empty());

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn offsets_follow_measured_durations() {
    let root = temp_dir("rounding");
    let job = job_for(fixture(&root, 2, 5000, 1000), &root);
    let encoder = Arc::new(DryRunEncoder::new().with_rounding_offset(0.04));

    let summary = render_slideshow(job, encoder.clone(), None).await.unwrap();

    // Clips measure 5.04 s, so the crossfade starts at 4.04 s.
    let jobs = encoder.jobs();
    let merge = jobs.iter().find(|j| j.label.starts_with("merge")).unwrap();
    assert!(merge.args.iter().any(|a| a.contains("offset=4.040")));
    assert!((summary.composed_duration_secs - (4.04 + 5.04 + 0.04)).abs() < 1e-6);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn audio_drift_shortens_offset() {
    let root = temp_dir("drift");
    let job = job_for(fixture(&root, 2, 5000, 1000), &root);
    let encoder = Arc::new(DryRunEncoder::new().with_audio_drift(1.5));

    let summary = render_slideshow(job, encoder.clone(), None).await.unwrap();

    let jobs = encoder.jobs();
    let merge = jobs.iter().find(|j| j.label.starts_with("merge")).unwrap();
    assert!(merge.args.iter().any(|a| a.contains("offset=3.000")));
    assert!((summary.composed_duration_secs - 8.0).abs() < 1e-6);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn shared_audio_source_is_trimmed_per_slide() {
    let root = temp_dir("shared_audio");
    let mut show = fixture(&root, 3, 2000, 500);
    let music = root.join("music.mp3");
    std::fs::write(&music, b"mp3").unwrap();
    show.slides[0].audio_tracks.push(AudioTrackRef::background(&music));
    show.slides[2].audio_tracks.push(AudioTrackRef::background(&music));
    let job = job_for(show, &root);
    let encoder = Arc::new(DryRunEncoder::new());

    render_slideshow(job, encoder.clone(), None).await.unwrap();

    let jobs = encoder.jobs();
    let mux = jobs.iter().find(|j| j.label == "mux audio").unwrap();
    let music_arg = music.display().to_string();
    assert_eq!(mux.args.iter().filter(|a| **a == music_arg).count(), 1);
    let graph = mux.args.iter().find(|a| a.contains("concat=")).unwrap();
    assert!(graph.contains("atrim=start=2.000:duration=2.000"));

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn repeated_renders_issue_identical_jobs() {
    let root = temp_dir("idempotent");
    let show = fixture(&root, 5, 3000, 1000);

    let mut runs = vec![];
    for _ in 0..2 {
        let encoder = Arc::new(DryRunEncoder::new());
        render_slideshow(job_for(show.clone(), &root), encoder.clone(), None)
            .await
            .unwrap();
        let mut args: Vec<Vec<String>> = encoder.jobs().into_iter().map(|j| j.args).collect();
        args.sort();
        runs.push(args);
    }
    assert_eq!(runs[0], runs[1]);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn temp_dir_removed_unless_kept() {
    let root = temp_dir("temps");
    let show = fixture(&root, 2, 2000, 500);

    let summary = render_slideshow(job_for(show.clone(), &root), Arc::new(DryRunEncoder::new()), None)
        .await
        .unwrap();
    assert!(summary.temp_dir.is_none());
    assert!(!root.join("tmp").exists());

    let mut job = job_for(show, &root);
    job.keep_temps = true;
    let summary = render_slideshow(job, Arc::new(DryRunEncoder::new()), None)
        .await
        .unwrap();
    assert_eq!(summary.temp_dir, Some(root.join("tmp")));
    assert!(root.join("tmp").exists());

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn progress_reaches_every_stage() {
    let root = temp_dir("progress");
    let job = job_for(fixture(&root, 4, 2000, 500), &root);
    let seen: Arc<Mutex<Vec<RenderProgress>>> = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |p: RenderProgress| sink.lock().unwrap().push(p));

    render_slideshow(job, Arc::new(DryRunEncoder::new()), Some(callback))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let stages: HashSet<RenderStage> = seen.iter().map(|p| p.stage).collect();
    for stage in [
        RenderStage::Probing,
        RenderStage::RenderingClips,
        RenderStage::Compositing,
        RenderStage::SyncingAudio,
        RenderStage::Finalizing,
        RenderStage::Complete,
    ] {
        assert!(stages.contains(&stage), "missing {stage:?}");
    }
    assert!(seen
        .iter()
        .any(|p| p.stage == RenderStage::Compositing && p.completed == 3 && p.total == 3));
    assert_eq!(seen.last().unwrap().stage, RenderStage::Complete);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn merges_use_junction_transition_and_keep_slide_order() {
    for n in [2usize, 3, 5, 7, 13] {
        let slides: Vec<Slide> = (0..n)
            .map(|i| {
                let mut slide = Slide::new(format!("/img/slide{i}.jpg"));
                slide.display_duration_ms = Some(3000);
                slide.transition = Transition::new(format!("k{i}"), 100 * (i as u32 + 1));
                slide
            })
            .collect();
        let encoder = Arc::new(DryRunEncoder::new());
        let limiter = Arc::new(Semaphore::new(4));
        let layout = TempLayout::new(temp_dir(&format!("junction_{n}")));

        let clips = render_clips(
            &slides,
            encoder.clone(),
            limiter.clone(),
            &layout,
            Resolution::HD,
            |_| {},
        )
        .await
        .unwrap();
        let ctx = MergeContext::new(
            encoder.clone(),
            limiter,
            composition_for(RenderStrategy::Modern),
            Arc::new(slides),
            layout,
            Resolution::HD,
            1.0,
        );
        let tree = composite(Arc::new(ctx), clips).await.unwrap();

        assert_eq!(tree.root.indices, (0..n).collect::<Vec<_>>());
        assert_eq!(tree.merges, n - 1);

        let merges: Vec<_> = encoder
            .jobs()
            .into_iter()
            .filter(|j| j.label.starts_with("merge"))
            .collect();
        assert_eq!(merges.len(), n - 1);
        for job in &merges {
            // Label: "merge {first}..={last} at depth {d}".
            let range = job.label["merge ".len()..].split(' ').next().unwrap();
            let (first, last) = range.split_once("..=").unwrap();
            let first: usize = first.parse().unwrap();
            let last: usize = last.parse().unwrap();
            let junction = first + (last - first + 1) / 2 - 1;

            let expected = format!(
                "xfade=transition=k{junction}:duration={:.3}:",
                (junction + 1) as f64 * 0.1
            );
            assert!(
                job.args.iter().any(|a| a.contains(&expected)),
                "{} should crossfade with {expected}",
                job.label
            );
        }
    }
}

/// Fails every job whose label starts with `prefix`.
struct FailingEncoder {
    inner: DryRunEncoder,
    prefix: &'static str,
}

impl Encoder for FailingEncoder {
    fn run(&self, job: &EncoderJob) -> StoryreelResult<()> {
        if job.label.starts_with(self.prefix) {
            return Err(StoryreelError::encoder(
                "ffmpeg",
                "exit status: 1",
                "Invalid data found when processing input",
            ));
        }
        self.inner.run(job)
    }

    fn probe_duration(&self, path: &Path) -> StoryreelResult<f64> {
        self.inner.probe_duration(path)
    }

    fn probe_audio_duration(&self, path: &Path) -> StoryreelResult<Option<f64>> {
        self.inner.probe_audio_duration(path)
    }

    fn version_banner(&self) -> StoryreelResult<String> {
        self.inner.version_banner()
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn encoder_failure_aborts_render_and_keeps_temps() {
    let root = temp_dir("failure");
    let job = job_for(fixture(&root, 4, 2000, 500), &root);
    let encoder = Arc::new(FailingEncoder {
        inner: DryRunEncoder::new(),
        prefix: "merge",
    });

    let err = render_slideshow(job, encoder.clone(), None).await.unwrap_err();
    match err {
        StoryreelError::Encoder { diagnostics, .. } => {
            assert!(diagnostics.contains("Invalid data"))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(root.join("tmp").exists());
    assert!(!encoder.inner.jobs().iter().any(|j| j.label == "publish"));

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn missing_image_fails_validation() {
    let root = temp_dir("missing_image");
    let mut show = fixture(&root, 2, 2000, 500);
    show.slides[1].image = root.join("gone.jpg");
    let encoder = Arc::new(DryRunEncoder::new());

    let err = render_slideshow(job_for(show, &root), encoder.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoryreelError::Validation { .. }));
    assert!(encoder.jobs().is_empty());

    std::fs::remove_dir_all(&root).ok();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn offset_is_never_negative(
        video in 0.0f64..120.0,
        drift in -5.0f64..5.0,
        transition in 0.0f64..10.0,
    ) {
        let d = crossfade_offset(video, Some(video + drift), transition, 1.0);
        prop_assert!(d.offset_secs >= 0.0);
        if video >= 2.0 * transition {
            prop_assert!(!d.clamped);
        }
    }

    #[test]
    fn merge_tree_shape(count in 1usize..40) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let root = temp_dir(&format!("tree_{count}"));
        let job = job_for(fixture(&root, count, 3000, 1000), &root);
        let encoder = Arc::new(DryRunEncoder::new());

        let summary = runtime
            .block_on(render_slideshow(job, encoder.clone(), None))
            .unwrap();

        let expected_height = (count as f64).log2().ceil() as usize;
        prop_assert_eq!(summary.merges, count - 1);
        prop_assert_eq!(summary.tree_height, expected_height);

        let merges = merge_outputs(&encoder);
        let unique: HashSet<_> = merges.iter().collect();
        prop_assert_eq!(unique.len(), merges.len());

        // Each merge adds 3 s and overlaps 1 s.
        let expected = 3.0 * count as f64 - (count as f64 - 1.0);
        prop_assert!((summary.composed_duration_secs - expected).abs() < 1e-6);

        std::fs::remove_dir_all(&root).ok();
    }
}
