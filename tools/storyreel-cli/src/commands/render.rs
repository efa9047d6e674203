//! Render a slideshow template to video.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use storyreel_common::config::AppConfig;
use storyreel_render_engine::motion::Resolution;
use storyreel_render_engine::{
    render_slideshow, DryRunEncoder, Encoder, FfmpegEncoder, ProgressCallback, RenderJob,
    RenderProgress, RenderSummary,
};

#[derive(Args)]
pub struct RenderArgs {
    /// Template file; the first *.slideshow under the current directory if omitted
    pub template: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Temporary directory for intermediate clips
    #[arg(short, long)]
    pub temp_dir: Option<PathBuf>,

    /// Render at 852x480 instead of 1280x720
    #[arg(long)]
    pub low_quality: bool,

    /// Keep intermediate files
    #[arg(long)]
    pub save_temps: bool,

    /// Use the overlay fade even when the encoder supports crossfades
    #[arg(long)]
    pub legacy_fade: bool,

    /// Maximum concurrent encoder processes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the encoder commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(config: &AppConfig, args: RenderArgs) -> anyhow::Result<()> {
    let (path, slideshow) = super::load(args.template.clone())?;
    println!("Rendering template: {}", path.display());

    let mut job = RenderJob::with_defaults(slideshow, &config.render);
    job.output_dir = args.output.clone();
    job.temp_dir = args.temp_dir.clone();
    job.force_legacy = args.legacy_fade;
    job.keep_temps |= args.save_temps;
    if args.low_quality {
        job.resolution = Resolution::LOW;
    }
    if let Some(jobs) = args.jobs {
        job.max_parallel_jobs = jobs.max(1);
    }

    println!("  Slides: {}", job.slideshow.len());
    println!("  Resolution: {}", job.resolution);
    println!("  Output: {}", job.output_path().display());

    if args.dry_run {
        let encoder = Arc::new(DryRunEncoder::new());
        let summary = render(job, encoder.clone()).await?;
        println!();
        for step in encoder.plan() {
            println!("{step}");
        }
        print_summary(&summary);
        return Ok(());
    }

    let encoder = FfmpegEncoder::from_config(&config.encoder);
    if !encoder.is_available() {
        anyhow::bail!(
            "Cannot run {}. Install ffmpeg or set encoder.ffmpeg in the config file.",
            config.encoder.ffmpeg.display()
        );
    }
    let summary = render(job, Arc::new(encoder)).await?;
    print_summary(&summary);
    Ok(())
}

async fn render(job: RenderJob, encoder: Arc<dyn Encoder>) -> anyhow::Result<RenderSummary> {
    let progress_cb: ProgressCallback = Arc::new(|p: RenderProgress| {
        print!(
            "\r  {}: {}/{} ({:.0}%)    ",
            p.stage.as_str(),
            p.completed,
            p.total,
            p.fraction() * 100.0
        );
    });

    render_slideshow(job, encoder, Some(progress_cb))
        .await
        .map_err(|e| anyhow::anyhow!("\nRender failed: {e}"))
}

fn print_summary(summary: &RenderSummary) {
    println!("\nRender complete: {}", summary.output_path.display());
    println!(
        "  Encoder: {} ({} strategy)",
        summary.encoder_version, summary.strategy
    );
    println!(
        "  Clips: {}, merges: {}, tree height: {}",
        summary.clips, summary.merges, summary.tree_height
    );
    println!("  Duration: {:.2}s", summary.final_duration_secs);
    println!("  Elapsed: {:.1}s", summary.elapsed_secs);
    if let Some(dir) = &summary.temp_dir {
        println!("  Temporary files kept in: {}", dir.display());
    }
}
