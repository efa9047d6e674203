//! Show slideshow information.

use std::path::PathBuf;

use storyreel_render_engine::audio::AudioPlan;

pub fn run(template: Option<PathBuf>) -> anyhow::Result<()> {
    let (path, slideshow) = super::load(template)?;

    println!("Slideshow: {}", slideshow.name);
    println!("  Template: {}", path.display());
    println!(
        "  Nominal duration: {:.1}s",
        slideshow.nominal_duration_ms() as f64 / 1000.0
    );
    println!();

    println!("Slides:");
    let last = slideshow.len().saturating_sub(1);
    for (i, slide) in slideshow.slides.iter().enumerate() {
        println!(
            "  {i:>3}: {} ({:.1}s)",
            slide.image.display(),
            f64::from(slide.effective_duration_ms()) / 1000.0
        );
        if i < last {
            println!(
                "       transition: {} {:.1}s",
                slide.transition.kind,
                f64::from(slide.transition.duration_ms) / 1000.0
            );
        }
        if !slide.motion.is_static() {
            println!(
                "       motion: [{}] -> [{}]",
                slide.motion.start, slide.motion.end
            );
        }
        if let Some(audio) = slide.primary_audio() {
            println!(
                "       audio: {}{}",
                audio.path.display(),
                if audio.background { " (background)" } else { "" }
            );
        }
    }
    println!();

    let plan = AudioPlan::build(&slideshow.slides);
    println!("Audio:");
    if plan.is_silent() {
        println!("  (silent)");
    }
    for segment in &plan.segments {
        println!(
            "  {}: slides {}..={} ({} slide(s))",
            segment.source.display(),
            segment.first_slide(),
            segment.last_slide(),
            segment.slides.len()
        );
    }

    Ok(())
}
