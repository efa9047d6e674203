pub mod check;
pub mod compare;
pub mod info;
pub mod render;
pub mod validate;

use std::path::PathBuf;

use storyreel_project_model::template::{discover_template, load_template};
use storyreel_project_model::Slideshow;

/// The given template, or the first one found under the current directory.
pub fn resolve_template(template: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match template {
        Some(path) => Ok(path),
        None => discover_template(".").ok_or_else(|| {
            anyhow::anyhow!("No .slideshow template found under the current directory")
        }),
    }
}

pub fn load(template: Option<PathBuf>) -> anyhow::Result<(PathBuf, Slideshow)> {
    let path = resolve_template(template)?;
    let slideshow =
        load_template(&path).map_err(|e| anyhow::anyhow!("Failed to load template: {e}"))?;
    Ok((path, slideshow))
}
