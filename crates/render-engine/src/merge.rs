//! Merge-tree compositor.
//!
//! The ordered clip list is split at its midpoint, each half is composited
//! recursively (the left half on its own task), and the two results are
//! joined with a crossfade. For `N` clips this performs `N - 1` merges in a
//! tree of height `ceil(log2 N)`.
//!
//! Crossfade offsets come from the *measured* length of the left composite,
//! never from declared slide durations, because encoder rounding and earlier
//! merges make nominal durations drift.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use storyreel_common::clock::{ms_to_secs, DriftMeasurement};
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_project_model::slide::Slide;
use tokio::sync::Semaphore;

use crate::artifacts::TempLayout;
use crate::clip::RenderedClip;
use crate::encoder::{run_and_probe, Encoder, EncoderJob, MediaInput, ProducedArtifact};
use crate::motion::Resolution;
use crate::strategy::{CompositionStrategy, MergeParams};

/// A composited group of contiguous slides.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNode {
    /// Left-most slide index; the group's identity.
    pub anchor: usize,
    /// Recursion depth of the call that produced this node (root = 0).
    pub depth: usize,
    /// Merges on the longest path down to a leaf (leaf = 0).
    pub height: usize,
    /// Slide indices covered, in order.
    pub indices: Vec<usize>,
    pub path: PathBuf,
    /// Measured video duration, seconds.
    pub duration_secs: f64,
    /// Measured audio duration, seconds.
    pub audio_duration_secs: Option<f64>,
}

impl CompositeNode {
    fn leaf(clip: RenderedClip) -> Self {
        Self {
            anchor: clip.index,
            depth: 0,
            height: 0,
            indices: vec![clip.index],
            path: clip.path,
            duration_secs: clip.duration_secs,
            audio_duration_secs: clip.audio_duration_secs,
        }
    }

    /// The artifact view of this node.
    pub fn artifact(&self) -> ProducedArtifact {
        ProducedArtifact {
            path: self.path.clone(),
            duration_secs: self.duration_secs,
            audio_duration_secs: self.audio_duration_secs,
        }
    }

    /// Slide whose transition joins this group to the next one.
    fn junction(&self) -> usize {
        self.indices.last().copied().unwrap_or(self.anchor)
    }
}

/// Outcome of the crossfade offset computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetDecision {
    pub offset_secs: f64,
    /// The drift rule subtracted a second transition duration.
    pub drift_compensated: bool,
    /// The raw offset was negative and was raised to zero.
    pub clamped: bool,
}

/// Crossfade offset for merging a left composite into its right neighbour.
///
/// `offset = left_video - transition`. When the left composite's audio and
/// video lengths disagree by more than `tolerance_secs`, one more transition
/// length is subtracted. That rule reproduces long-standing observable
/// behaviour; it has no derivation and is not a correctness guarantee. The
/// result is never negative.
pub fn crossfade_offset(
    left_video_secs: f64,
    left_audio_secs: Option<f64>,
    transition_secs: f64,
    tolerance_secs: f64,
) -> OffsetDecision {
    let mut offset = left_video_secs - transition_secs;

    let drift_compensated = left_audio_secs
        .map(|audio| DriftMeasurement::new(left_video_secs, audio).exceeds_threshold(tolerance_secs))
        .unwrap_or(false);
    if drift_compensated {
        offset -= transition_secs;
    }

    let clamped = offset < 0.0;
    OffsetDecision {
        offset_secs: offset.max(0.0),
        drift_compensated,
        clamped,
    }
}

/// Everything a merge needs, shared by all tasks of one tree.
pub struct MergeContext {
    pub encoder: Arc<dyn Encoder>,
    pub limiter: Arc<Semaphore>,
    pub composition: Arc<dyn CompositionStrategy>,
    pub slides: Arc<Vec<Slide>>,
    pub layout: TempLayout,
    pub resolution: Resolution,
    pub drift_tolerance_secs: f64,
    merges: AtomicUsize,
    on_merge: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

impl MergeContext {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        limiter: Arc<Semaphore>,
        composition: Arc<dyn CompositionStrategy>,
        slides: Arc<Vec<Slide>>,
        layout: TempLayout,
        resolution: Resolution,
        drift_tolerance_secs: f64,
    ) -> Self {
        Self {
            encoder,
            limiter,
            composition,
            slides,
            layout,
            resolution,
            drift_tolerance_secs,
            merges: AtomicUsize::new(0),
            on_merge: None,
        }
    }

    /// Called with the running merge count after every merge.
    pub fn on_merge(mut self, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_merge = Some(Box::new(callback));
        self
    }

    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }
}

/// Result of compositing a whole clip list.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTree {
    pub root: CompositeNode,
    pub merges: usize,
    pub height: usize,
}

type NodeFuture = Pin<Box<dyn Future<Output = StoryreelResult<CompositeNode>> + Send>>;

/// Composite `clips` (in slide order) into one node.
pub async fn composite(ctx: Arc<MergeContext>, clips: Vec<RenderedClip>) -> StoryreelResult<MergeTree> {
    if clips.is_empty() {
        return Err(StoryreelError::validation("nothing to composite"));
    }

    let nodes: Vec<CompositeNode> = clips.into_iter().map(CompositeNode::leaf).collect();
    tracing::info!(
        clips = nodes.len(),
        strategy = %ctx.composition.kind(),
        "Compositing merge tree"
    );

    let root = build(ctx.clone(), nodes, 0).await?;
    Ok(MergeTree {
        height: root.height,
        merges: ctx.merges(),
        root,
    })
}

fn build(ctx: Arc<MergeContext>, mut nodes: Vec<CompositeNode>, depth: usize) -> NodeFuture {
    Box::pin(async move {
        if nodes.len() < 2 {
            let mut leaf = nodes
                .pop()
                .ok_or_else(|| StoryreelError::render("empty merge group"))?;
            leaf.depth = depth;
            return Ok(leaf);
        }

        let right_nodes = nodes.split_off(nodes.len() / 2);
        let left_task = tokio::spawn(build(ctx.clone(), nodes, depth + 1));

        let right = match build(ctx.clone(), right_nodes, depth + 1).await {
            Ok(right) => right,
            Err(e) => {
                left_task.abort();
                return Err(e);
            }
        };
        let left = left_task
            .await
            .map_err(|e| StoryreelError::render(format!("Merge task failed: {e}")))??;

        merge_pair(&ctx, left, right, depth).await
    })
}

async fn merge_pair(
    ctx: &MergeContext,
    left: CompositeNode,
    right: CompositeNode,
    depth: usize,
) -> StoryreelResult<CompositeNode> {
    let junction = left.junction();
    let transition = ctx
        .slides
        .get(junction)
        .map(|s| s.transition.clone())
        .ok_or_else(|| StoryreelError::render(format!("no slide at junction {junction}")))?;
    let transition_secs = ms_to_secs(transition.duration_ms);

    let decision = crossfade_offset(
        left.duration_secs,
        left.audio_duration_secs,
        transition_secs,
        ctx.drift_tolerance_secs,
    );
    if decision.drift_compensated {
        tracing::warn!(
            anchor = left.anchor,
            video_secs = left.duration_secs,
            audio_secs = ?left.audio_duration_secs,
            "Audio/video drift above tolerance, shortening crossfade offset"
        );
    }
    if decision.clamped {
        tracing::warn!(
            anchor = left.anchor,
            left_secs = left.duration_secs,
            transition_secs,
            "Crossfade offset was negative, clamped to zero"
        );
    }

    let params = MergeParams {
        transition: transition.kind,
        transition_secs,
        offset_secs: decision.offset_secs,
        right_duration_secs: right.duration_secs,
        resolution: ctx.resolution,
    };

    let output = ctx.layout.merge(left.anchor, depth);
    let job = EncoderJob::new(
        format!(
            "merge {}..={} at depth {depth}",
            left.anchor,
            right.junction()
        ),
        output,
    )
    .input(MediaInput::file(&left.path))
    .input(MediaInput::file(&right.path))
    .filter_graph(ctx.composition.merge_graph(&params))
    .options([
        "-map", "[v]", "-map", "[a]", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac",
    ])
    .expect_duration(params.output_duration_secs());

    let produced = run_and_probe(ctx.encoder.clone(), ctx.limiter.clone(), job).await?;

    let count = ctx.merges.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(cb) = &ctx.on_merge {
        cb(count);
    }

    tracing::debug!(
        anchor = left.anchor,
        depth,
        offset_secs = decision.offset_secs,
        duration_secs = produced.duration_secs,
        "Merged composites"
    );

    let mut indices = left.indices;
    indices.extend(right.indices);
    Ok(CompositeNode {
        anchor: left.anchor,
        depth,
        height: left.height.max(right.height) + 1,
        indices,
        path: produced.path,
        duration_secs: produced.duration_secs,
        audio_duration_secs: produced.audio_duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_uses_measured_left_duration() {
        let d = crossfade_offset(9.04, Some(9.04), 1.0, 1.0);
        assert!((d.offset_secs - 8.04).abs() < 1e-9);
        assert!(!d.drift_compensated);
        assert!(!d.clamped);
    }

    #[test]
    fn test_drift_rule_subtracts_transition_again() {
        let d = crossfade_offset(17.0, Some(18.5), 1.0, 1.0);
        assert!(d.drift_compensated);
        assert!((d.offset_secs - 15.0).abs() < 1e-9);

        // Exactly at tolerance does not trigger.
        let d = crossfade_offset(17.0, Some(18.0), 1.0, 1.0);
        assert!(!d.drift_compensated);

        // No audio stream, no drift check.
        let d = crossfade_offset(17.0, None, 1.0, 1.0);
        assert!(!d.drift_compensated);
    }

    #[test]
    fn test_offset_clamped_at_zero() {
        let d = crossfade_offset(0.5, Some(0.5), 1.0, 1.0);
        assert!(d.clamped);
        assert_eq!(d.offset_secs, 0.0);
    }
}
