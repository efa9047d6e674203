//! Validate a slideshow template.

use std::path::PathBuf;

pub fn run(template: Option<PathBuf>) -> anyhow::Result<()> {
    let (path, slideshow) = super::load(template)?;
    println!("Validating template at: {}", path.display());
    println!("  Name: {}", slideshow.name);
    println!("  Slides: {}", slideshow.len());

    let issues = slideshow.validate();
    if issues.is_empty() {
        println!("\nTemplate is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for issue in &issues {
        let tag = if issue.is_blocking() { "ERROR" } else { "WARN" };
        println!("  [{tag}] {issue}");
    }

    let blocking = issues.iter().filter(|i| i.is_blocking()).count();
    if blocking > 0 {
        anyhow::bail!("{blocking} blocking issue(s) found. Template cannot be rendered.");
    }
    println!("\n{} warning(s). Template can be rendered.", issues.len());
    Ok(())
}
