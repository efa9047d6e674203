//! A single slide: image, audio, transition, timing, and motion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::motion::Motion;

/// Display duration used when a slide declares none.
pub const DEFAULT_DISPLAY_DURATION_MS: u32 = 5000;

/// Transition used when a slide declares none.
pub const DEFAULT_TRANSITION_KIND: &str = "fade";

/// Transition duration used when a slide declares none.
pub const DEFAULT_TRANSITION_DURATION_MS: u32 = 1000;

/// Reference to an audio file played over a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackRef {
    pub path: PathBuf,

    /// Background music rather than narration.
    #[serde(default)]
    pub background: bool,

    /// Volume hint carried from the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl AudioTrackRef {
    pub fn narration(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            background: false,
            volume: None,
        }
    }

    pub fn background(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            background: true,
            volume: None,
        }
    }
}

/// Transition into the following slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transition {
    /// Encoder transition name (e.g. `fade`, `wipeleft`).
    pub kind: String,
    pub duration_ms: u32,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            kind: DEFAULT_TRANSITION_KIND.to_string(),
            duration_ms: DEFAULT_TRANSITION_DURATION_MS,
        }
    }
}

impl Transition {
    pub fn new(kind: impl Into<String>, duration_ms: u32) -> Self {
        Self {
            kind: kind.into(),
            duration_ms,
        }
    }
}

/// One slide of a slideshow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub image: PathBuf,

    #[serde(default)]
    pub audio_tracks: Vec<AudioTrackRef>,

    #[serde(default)]
    pub transition: Transition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_duration_ms: Option<u32>,

    #[serde(default)]
    pub motion: Motion,
}

impl Slide {
    /// A slide showing `image` with every other field at its default.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            audio_tracks: vec![],
            transition: Transition::default(),
            display_duration_ms: None,
            motion: Motion::default(),
        }
    }

    /// Declared display duration, or 5000 ms.
    pub fn effective_duration_ms(&self) -> u32 {
        self.display_duration_ms
            .unwrap_or(DEFAULT_DISPLAY_DURATION_MS)
    }

    /// The track heard during this slide: its background track when it has
    /// one, otherwise its first narration track.
    pub fn primary_audio(&self) -> Option<&AudioTrackRef> {
        self.audio_tracks
            .iter()
            .find(|t| t.background)
            .or_else(|| self.audio_tracks.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let slide = Slide::new("a.jpg");
        assert_eq!(slide.effective_duration_ms(), 5000);
        assert_eq!(slide.transition.kind, "fade");
        assert_eq!(slide.transition.duration_ms, 1000);
        assert!(slide.motion.is_static());
        assert!(slide.primary_audio().is_none());
    }

    #[test]
    fn test_primary_audio_prefers_background() {
        let mut slide = Slide::new("a.jpg");
        slide.audio_tracks = vec![
            AudioTrackRef::narration("voice.mp3"),
            AudioTrackRef::background("music.mp3"),
        ];
        assert_eq!(
            slide.primary_audio().unwrap().path,
            PathBuf::from("music.mp3")
        );

        slide.audio_tracks.remove(1);
        assert_eq!(
            slide.primary_audio().unwrap().path,
            PathBuf::from("voice.mp3")
        );
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let slide: Slide = serde_json::from_str(r#"{ "image": "p.png" }"#).unwrap();
        assert_eq!(slide, Slide::new("p.png"));

        let slide: Slide = serde_json::from_str(
            r#"{ "image": "p.png", "transition": { "kind": "wipeleft" }, "display_duration_ms": 9400 }"#,
        )
        .unwrap();
        assert_eq!(slide.transition, Transition::new("wipeleft", 1000));
        assert_eq!(slide.effective_duration_ms(), 9400);
    }
}
