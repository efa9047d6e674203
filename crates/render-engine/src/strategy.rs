//! Render strategy selection.
//!
//! Encoders from 4.3 on ship the `xfade` filter and get the
//! [`RenderStrategy::Modern`] crossfade composition. Older encoders get the
//! [`RenderStrategy::Legacy`] overlay/fade composition on a black canvas.

use std::fmt;
use std::sync::Arc;

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::encoder::Encoder;
use crate::filter_graph::{Filter, FilterChain, FilterGraph};
use crate::motion::Resolution;

/// A `major.minor[.patch]` encoder version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl EncoderVersion {
    /// Parse a version token such as `4.3.1`, `n6.1` or `4.4.2-0ubuntu0.22.04.1`.
    ///
    /// A leading non-digit prefix is skipped and anything after the numeric
    /// `major.minor[.patch]` run is ignored.
    pub fn parse(text: &str) -> StoryreelResult<Self> {
        let malformed = || StoryreelError::malformed("encoder version", text);

        let numeric: String = text
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let numbers = numeric
            .trim_end_matches('.')
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| malformed())?;

        match numbers.as_slice() {
            [major, minor] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: None,
            }),
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: Some(*patch),
            }),
            _ => Err(malformed()),
        }
    }

    /// Extract the version that follows the word `version` in a banner.
    pub fn from_banner(banner: &str) -> StoryreelResult<Self> {
        let first_line = banner.lines().next().unwrap_or("").trim();
        let token = banner
            .split_whitespace()
            .skip_while(|word| *word != "version")
            .nth(1)
            .ok_or_else(|| StoryreelError::malformed("encoder version banner", first_line))?;
        Self::parse(token)
    }
}

impl fmt::Display for EncoderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// How adjacent clips are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    /// Fade-in plus time-shifted overlay on a blank canvas.
    Legacy,
    /// Native `xfade` crossfades.
    Modern,
}

impl RenderStrategy {
    pub fn for_version(version: &EncoderVersion) -> Self {
        if version.major > 4 || (version.major == 4 && version.minor >= 3) {
            Self::Modern
        } else {
            Self::Legacy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        }
    }
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe the encoder once and pick a strategy.
///
/// `force_legacy` selects [`RenderStrategy::Legacy`] regardless of version,
/// but the banner must still parse.
pub fn select_strategy(
    encoder: &dyn Encoder,
    force_legacy: bool,
) -> StoryreelResult<(RenderStrategy, EncoderVersion)> {
    let banner = encoder.version_banner()?;
    let version = EncoderVersion::from_banner(&banner)?;
    let strategy = if force_legacy {
        RenderStrategy::Legacy
    } else {
        RenderStrategy::for_version(&version)
    };

    tracing::info!(
        encoder = encoder.name(),
        version = %version,
        strategy = %strategy,
        forced = force_legacy,
        "Selected render strategy"
    );
    Ok((strategy, version))
}

/// Parameters of one pairwise merge. Input 0 is the left composite,
/// input 1 the right one.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeParams {
    pub transition: String,
    pub transition_secs: f64,
    pub offset_secs: f64,
    pub right_duration_secs: f64,
    pub resolution: Resolution,
}

impl MergeParams {
    /// Length of the merged result.
    pub fn output_duration_secs(&self) -> f64 {
        self.offset_secs + self.right_duration_secs
    }
}

/// Builds the filter graph that merges two composites into `[v]` and `[a]`.
pub trait CompositionStrategy: Send + Sync {
    fn kind(&self) -> RenderStrategy;

    fn merge_graph(&self, params: &MergeParams) -> FilterGraph;
}

/// `xfade` video with `acrossfade` audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossfadeComposition;

impl CompositionStrategy for CrossfadeComposition {
    fn kind(&self) -> RenderStrategy {
        RenderStrategy::Modern
    }

    fn merge_graph(&self, params: &MergeParams) -> FilterGraph {
        FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input("0:v")
                    .input("1:v")
                    .filter(
                        Filter::new("xfade")
                            .opt("transition", &params.transition)
                            .opt("duration", secs(params.transition_secs))
                            .opt("offset", secs(params.offset_secs)),
                    )
                    .filter(Filter::new("format").arg("yuv420p"))
                    .output("v"),
            )
            .chain(audio_crossfade(params))
    }
}

/// Right clip fades in over the left one on a black canvas.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayFadeComposition;

impl CompositionStrategy for OverlayFadeComposition {
    fn kind(&self) -> RenderStrategy {
        RenderStrategy::Legacy
    }

    fn merge_graph(&self, params: &MergeParams) -> FilterGraph {
        let size = params.resolution.to_string();
        FilterGraph::new()
            .chain(
                FilterChain::new()
                    .filter(
                        Filter::new("color")
                            .opt("c", "black")
                            .opt("s", size)
                            .opt("d", secs(params.output_duration_secs())),
                    )
                    .output("base"),
            )
            .chain(
                FilterChain::new()
                    .input("0:v")
                    .filter(Filter::new("setpts").arg("PTS-STARTPTS"))
                    .output("left"),
            )
            .chain(
                FilterChain::new()
                    .input("1:v")
                    .filter(Filter::new("format").arg("yuva420p"))
                    .filter(
                        Filter::new("fade")
                            .opt("t", "in")
                            .opt("st", 0)
                            .opt("d", secs(params.transition_secs))
                            .opt("alpha", 1),
                    )
                    .filter(
                        Filter::new("setpts")
                            .arg(format!("PTS-STARTPTS+{}/TB", secs(params.offset_secs))),
                    )
                    .output("right"),
            )
            .chain(
                FilterChain::new()
                    .input("base")
                    .input("left")
                    .filter(Filter::new("overlay"))
                    .output("under"),
            )
            .chain(
                FilterChain::new()
                    .input("under")
                    .input("right")
                    .filter(Filter::new("overlay"))
                    .filter(Filter::new("format").arg("yuv420p"))
                    .output("v"),
            )
            .chain(audio_crossfade(params))
    }
}

/// The composition used for `strategy`.
pub fn composition_for(strategy: RenderStrategy) -> Arc<dyn CompositionStrategy> {
    match strategy {
        RenderStrategy::Modern => Arc::new(CrossfadeComposition),
        RenderStrategy::Legacy => Arc::new(OverlayFadeComposition),
    }
}

fn audio_crossfade(params: &MergeParams) -> FilterChain {
    FilterChain::new()
        .input("0:a")
        .input("1:a")
        .filter(Filter::new("acrossfade").opt("d", secs(params.transition_secs)))
        .output("a")
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}
