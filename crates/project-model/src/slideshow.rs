//! Ordered slides plus the name used for the output file.

use serde::{Deserialize, Serialize};
use storyreel_common::{StoryreelError, StoryreelResult};

use crate::slide::Slide;

/// A parsed slideshow. Slide order is preserved everywhere downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slideshow {
    pub name: String,
    pub slides: Vec<Slide>,
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Rendering cannot proceed.
    Error,
    /// Rendering proceeds but the result may look wrong.
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Index of the offending slide, if the issue is slide-specific.
    pub slide: Option<usize>,
    pub message: String,
}

impl ValidationIssue {
    fn error(slide: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            slide,
            message: message.into(),
        }
    }

    fn warning(slide: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            slide,
            message: message.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slide {
            Some(i) => write!(f, "slide {i}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Slideshow {
    pub fn new(name: impl Into<String>, slides: Vec<Slide>) -> Self {
        Self {
            name: name.into(),
            slides,
        }
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Sum of display durations minus the transitions between adjacent
    /// slides, i.e. the length of the composed video before encoder rounding.
    pub fn nominal_duration_ms(&self) -> u64 {
        let shown: u64 = self
            .slides
            .iter()
            .map(|s| u64::from(s.effective_duration_ms()))
            .sum();
        let overlapped: u64 = self
            .slides
            .iter()
            .take(self.slides.len().saturating_sub(1))
            .map(|s| u64::from(s.transition.duration_ms))
            .sum();
        shown.saturating_sub(overlapped)
    }

    /// Check the slideshow for problems. Referenced files are expected to
    /// be resolved already (absolute or relative to the working directory).
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = vec![];

        if self.slides.is_empty() {
            issues.push(ValidationIssue::error(None, "slideshow has no slides"));
            return issues;
        }

        let last = self.slides.len() - 1;
        for (i, slide) in self.slides.iter().enumerate() {
            let at = Some(i);

            if !slide.image.exists() {
                issues.push(ValidationIssue::error(
                    at,
                    format!("image missing: {}", slide.image.display()),
                ));
            }
            for track in &slide.audio_tracks {
                if !track.path.exists() {
                    issues.push(ValidationIssue::error(
                        at,
                        format!("audio missing: {}", track.path.display()),
                    ));
                }
            }

            let duration = slide.effective_duration_ms();
            if duration == 0 {
                issues.push(ValidationIssue::error(at, "display duration is zero"));
            }

            // The last slide's transition is never used.
            if i < last {
                let transition = &slide.transition;
                if transition.kind.trim().is_empty() {
                    issues.push(ValidationIssue::error(at, "transition kind is empty"));
                }
                if transition.duration_ms == 0 {
                    issues.push(ValidationIssue::error(at, "transition duration is zero"));
                } else if transition.duration_ms >= duration && duration > 0 {
                    issues.push(ValidationIssue::warning(
                        at,
                        format!(
                            "transition ({} ms) is not shorter than the slide ({} ms)",
                            transition.duration_ms, duration
                        ),
                    ));
                }
            }

            for (label, rect) in [("start", slide.motion.start), ("end", slide.motion.end)] {
                if !rect.has_area() {
                    issues.push(ValidationIssue::error(
                        at,
                        format!("{label} rectangle has no area: {rect}"),
                    ));
                } else if !rect.is_within_image() {
                    issues.push(ValidationIssue::warning(
                        at,
                        format!("{label} rectangle extends outside the image: {rect}"),
                    ));
                }
            }
        }

        issues
    }

    /// Fail with a validation error if any blocking issue exists.
    pub fn ensure_renderable(&self) -> StoryreelResult<()> {
        let blocking: Vec<String> = self
            .validate()
            .iter()
            .filter(|i| i.is_blocking())
            .map(ToString::to_string)
            .collect();

        if blocking.is_empty() {
            Ok(())
        } else {
            Err(StoryreelError::validation(blocking.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionRect;
    use crate::slide::Transition;

    fn temp_image(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"img").unwrap();
        path
    }

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "storyreel-model-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_nominal_duration() {
        let slides = (0..8)
            .map(|i| {
                let mut s = Slide::new(format!("{i}.jpg"));
                s.display_duration_ms = Some(5000);
                s
            })
            .collect();
        let show = Slideshow::new("eight", slides);
        assert_eq!(show.nominal_duration_ms(), 33_000);
    }

    #[test]
    fn test_empty_slideshow_is_blocking() {
        let show = Slideshow::new("empty", vec![]);
        let err = show.ensure_renderable().unwrap_err();
        assert!(err.to_string().contains("no slides"));
    }

    #[test]
    fn test_missing_files_reported() {
        let mut slide = Slide::new("/nonexistent/storyreel/a.jpg");
        slide.audio_tracks.push(crate::AudioTrackRef::narration(
            "/nonexistent/storyreel/a.mp3",
        ));
        let show = Slideshow::new("missing", vec![slide]);
        let issues = show.validate();
        assert_eq!(issues.iter().filter(|i| i.is_blocking()).count(), 2);
        assert!(issues[0].to_string().starts_with("slide 0: image missing"));
    }

    #[test]
    fn test_long_transition_is_only_a_warning() {
        let dir = temp_dir("warn");
        let mut first = Slide::new(temp_image(&dir, "a.jpg"));
        first.display_duration_ms = Some(800);
        first.transition = Transition::new("fade", 1000);
        let second = Slide::new(temp_image(&dir, "b.jpg"));
        let show = Slideshow::new("warn", vec![first, second]);

        let issues = show.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(show.ensure_renderable().is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_last_slide_transition_ignored_and_rect_checked() {
        let dir = temp_dir("rect");
        let mut only = Slide::new(temp_image(&dir, "a.jpg"));
        only.transition = Transition::new("", 0);
        only.motion.end = MotionRect::new(0.5, 0.5, 0.0, 0.2);
        let show = Slideshow::new("rect", vec![only]);

        let issues = show.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("end rectangle has no area"));
        assert!(show.ensure_renderable().is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
