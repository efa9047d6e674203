//! Build a difference video of a render against a reference.

use std::path::PathBuf;

use storyreel_common::config::AppConfig;
use storyreel_render_engine::compare::{compare_videos, DEFAULT_COMPARISON_FILE};
use storyreel_render_engine::FfmpegEncoder;

pub fn run(
    config: &AppConfig,
    rendered: PathBuf,
    reference: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_COMPARISON_FILE));
    println!("Comparing {} against {}", rendered.display(), reference.display());

    let encoder = FfmpegEncoder::from_config(&config.encoder);
    let written = compare_videos(&encoder, &rendered, &reference, &output)
        .map_err(|e| anyhow::anyhow!("Comparison failed: {e}"))?;

    println!("Comparison written to: {}", written.display());
    Ok(())
}
