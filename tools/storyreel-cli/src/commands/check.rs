//! Check the encoder installation.

use storyreel_common::config::{config_file_path, AppConfig};
use storyreel_render_engine::strategy::select_strategy;
use storyreel_render_engine::FfmpegEncoder;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Storyreel System Check");
    println!("{}", "=".repeat(50));
    println!("Config file: {}", config_file_path().display());

    let encoder = FfmpegEncoder::from_config(&config.encoder);
    if !encoder.is_available() {
        println!("[FAIL] Encoder: {} not found", config.encoder.ffmpeg.display());
        println!("\nInstall ffmpeg or set encoder.ffmpeg in the config file.");
        return Ok(());
    }

    match select_strategy(&encoder, false) {
        Ok((strategy, version)) => {
            println!("[OK] Encoder: {} {version}", config.encoder.ffmpeg.display());
            println!("[OK] Transition strategy: {strategy}");
        }
        Err(e) => {
            println!("[FAIL] Encoder version: {e}");
            return Ok(());
        }
    }

    println!(
        "[OK] Parallel encoder jobs: {}",
        config.render.max_parallel_jobs
    );
    println!("\nStoryreel is ready.");
    Ok(())
}
