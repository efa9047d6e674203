//! Difference video for visual regression checks.
//!
//! The reference is made half transparent and negated, then laid over the
//! rendered video, so identical content cancels to flat grey and only the
//! differences stand out.

use std::path::{Path, PathBuf};

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::encoder::{Encoder, EncoderJob, MediaInput};
use crate::filter_graph::{Filter, FilterChain, FilterGraph};

/// File name used when no output path is given.
pub const DEFAULT_COMPARISON_FILE: &str = "overlay.mp4";

pub fn comparison_job(rendered: &Path, reference: &Path, output: &Path) -> EncoderJob {
    let graph = FilterGraph::new()
        .chain(
            FilterChain::new()
                .input("1:v")
                .filter(Filter::new("format").arg("yuva444p"))
                .filter(Filter::new("lut").opt("c3", 128))
                .filter(Filter::new("negate"))
                .output("reference"),
        )
        .chain(
            FilterChain::new()
                .input("0:v")
                .input("reference")
                .filter(Filter::new("overlay"))
                .output("out"),
        );

    EncoderJob::new("overlay comparison", output)
        .input(MediaInput::file(rendered))
        .input(MediaInput::file(reference))
        .filter_graph(graph)
        .options(["-map", "[out]"])
}

/// Write the difference video of `rendered` against `reference`.
pub fn compare_videos(
    encoder: &dyn Encoder,
    rendered: &Path,
    reference: &Path,
    output: &Path,
) -> StoryreelResult<PathBuf> {
    for path in [rendered, reference] {
        if !path.exists() {
            return Err(StoryreelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    encoder.run(&comparison_job(rendered, reference, output))?;
    tracing::info!(output = %output.display(), "Wrote comparison video");
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_graph() {
        let job = comparison_job(
            Path::new("final.mp4"),
            Path::new("expected.mp4"),
            Path::new("overlay.mp4"),
        );
        let args = job.to_args().unwrap();
        assert!(args.contains(
            &"[1:v]format=yuva444p,lut=c3=128,negate[reference];[0:v][reference]overlay[out]"
                .to_string()
        ));
        assert_eq!(args.last().unwrap(), "overlay.mp4");
    }

    #[test]
    fn test_missing_inputs_rejected() {
        let encoder = crate::dry_run::DryRunEncoder::new();
        let result = compare_videos(
            &encoder,
            Path::new("/nonexistent/storyreel/final.mp4"),
            Path::new("/nonexistent/storyreel/expected.mp4"),
            Path::new("/tmp/overlay.mp4"),
        );
        assert!(matches!(result, Err(StoryreelError::FileNotFound { .. })));
        assert!(encoder.jobs().is_empty());
    }
}
