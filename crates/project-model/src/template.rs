//! Loading slideshows from template files.
//!
//! Two formats are accepted:
//! - **`.slideshow` XML**, one `<slide>` element per slide
//! - **JSON**, the serialized form of [`Slideshow`] (the `name` may be omitted)
//!
//! Relative media paths are resolved against the template's directory.
//!
//! ```xml
//! <slideshow>
//!   <slide>
//!     <audio><background-filename volume="0.5">intro.mp3</background-filename></audio>
//!     <image>title.jpg</image>
//!     <motion start="0 0 1 1" end="0.1 0.1 0.8 0.8"/>
//!     <timing duration="9400"/>
//!     <transition duration="1000">fade</transition>
//!   </slide>
//! </slideshow>
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use storyreel_common::StoryreelError;

use crate::motion::{Motion, MotionRect};
use crate::slide::{AudioTrackRef, Slide, Transition};
use crate::slideshow::Slideshow;

/// File extension of XML templates.
pub const TEMPLATE_EXTENSION: &str = "slideshow";

/// Errors that can occur while loading a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML parse error in {path}: {source}")]
    XmlError {
        path: PathBuf,
        source: quick_xml::DeError,
    },

    #[error("JSON parse error in {path}: {source}")]
    JsonError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Malformed {what} in slide {slide}: {value:?}")]
    MalformedNumber {
        slide: usize,
        what: &'static str,
        value: String,
    },

    #[error("Invalid template: {message}")]
    Invalid { message: String },
}

impl From<TemplateError> for StoryreelError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::MalformedNumber { slide, what, value } => {
                StoryreelError::malformed(format!("{what} in slide {slide}"), value)
            }
            TemplateError::IoError { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                StoryreelError::FileNotFound { path }
            }
            other => StoryreelError::template(other.to_string()),
        }
    }
}

// XML document shape. Unknown elements and attributes are ignored.

#[derive(Debug, Deserialize)]
struct XmlSlideshow {
    #[serde(rename = "slide", default)]
    slides: Vec<XmlSlide>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlSlide {
    audio: Option<XmlAudio>,
    image: Option<String>,
    motion: Option<XmlMotion>,
    timing: Option<XmlTiming>,
    transition: Option<XmlTransition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlAudio {
    #[serde(rename = "background-filename")]
    background_filename: Option<XmlBackgroundFilename>,
    filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlBackgroundFilename {
    #[serde(rename = "@volume")]
    volume: Option<String>,
    #[serde(rename = "$text")]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlMotion {
    #[serde(rename = "@start")]
    start: Option<String>,
    #[serde(rename = "@end")]
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTiming {
    #[serde(rename = "@duration")]
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTransition {
    #[serde(rename = "@duration")]
    duration: Option<String>,
    #[serde(rename = "$text")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonSlideshow {
    #[serde(default)]
    name: Option<String>,
    slides: Vec<Slide>,
}

/// Load a slideshow from a template file, dispatching on its extension.
pub fn load_template(path: impl AsRef<Path>) -> Result<Slideshow, TemplateError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| TemplateError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let name = template_name(path);

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let slideshow = if is_json {
        let parsed: JsonSlideshow =
            serde_json::from_str(&content).map_err(|e| TemplateError::JsonError {
                path: path.to_path_buf(),
                source: e,
            })?;
        let slides = parsed
            .slides
            .into_iter()
            .map(|s| resolve_paths(s, base_dir))
            .collect();
        Slideshow::new(parsed.name.unwrap_or(name), slides)
    } else {
        let slides = parse_xml(&content, base_dir).map_err(|e| match e {
            XmlLoadError::Parse(source) => TemplateError::XmlError {
                path: path.to_path_buf(),
                source,
            },
            XmlLoadError::Template(e) => e,
        })?;
        Slideshow::new(name, slides)
    };

    tracing::debug!(
        template = %path.display(),
        slides = slideshow.len(),
        "Loaded slideshow template"
    );
    Ok(slideshow)
}

/// Slideshow name for a template path: its file name without extension.
pub fn template_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "slideshow".to_string())
}

/// Find the first `.slideshow` file under `root`, searching depth-first in
/// name order so the result is stable.
pub fn discover_template(root: impl AsRef<Path>) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(root.as_ref())
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(found) = entries.iter().find(|p| {
        p.is_file()
            && p
                .extension()
                .is_some_and(|ext| ext == TEMPLATE_EXTENSION)
    }) {
        return Some(found.clone());
    }

    entries
        .iter()
        .filter(|p| p.is_dir())
        .find_map(discover_template)
}

enum XmlLoadError {
    Parse(quick_xml::DeError),
    Template(TemplateError),
}

fn parse_xml(content: &str, base_dir: &Path) -> Result<Vec<Slide>, XmlLoadError> {
    let doc: XmlSlideshow = quick_xml::de::from_str(content).map_err(XmlLoadError::Parse)?;
    doc.slides
        .into_iter()
        .enumerate()
        .map(|(i, raw)| convert_slide(i, raw, base_dir))
        .collect::<Result<Vec<_>, _>>()
        .map_err(XmlLoadError::Template)
}

fn convert_slide(index: usize, raw: XmlSlide, base_dir: &Path) -> Result<Slide, TemplateError> {
    let image = raw
        .image
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TemplateError::Invalid {
            message: format!("slide {index} has no image"),
        })?;

    let mut slide = Slide::new(base_dir.join(image));

    if let Some(audio) = raw.audio {
        if let Some(bg) = audio.background_filename {
            let file = bg.path.trim();
            if !file.is_empty() {
                let volume = bg
                    .volume
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| parse_number::<f64>(index, "background volume", v))
                    .transpose()?;
                slide.audio_tracks.push(AudioTrackRef {
                    path: base_dir.join(file),
                    background: true,
                    volume,
                });
            }
        }
        if let Some(file) = audio.filename {
            let file = file.trim();
            if !file.is_empty() {
                slide
                    .audio_tracks
                    .push(AudioTrackRef::narration(base_dir.join(file)));
            }
        }
    }

    if let Some(motion) = raw.motion {
        if let Some(start) = motion.start.as_deref().filter(|s| !s.trim().is_empty()) {
            let end = motion.end.as_deref().unwrap_or(start);
            slide.motion = Motion::new(
                parse_rect(index, start)?,
                parse_rect(index, end)?,
            );
        }
    }

    if let Some(duration) = raw
        .timing
        .and_then(|t| t.duration)
        .filter(|d| !d.trim().is_empty())
    {
        slide.display_duration_ms = Some(parse_number(index, "display duration", &duration)?);
    }

    if let Some(transition) = raw.transition {
        let mut parsed = Transition::default();
        if let Some(kind) = transition.kind.map(|k| k.trim().to_string()) {
            if !kind.is_empty() {
                parsed.kind = kind;
            }
        }
        if let Some(duration) = transition.duration.filter(|d| !d.trim().is_empty()) {
            parsed.duration_ms = parse_number(index, "transition duration", &duration)?;
        }
        slide.transition = parsed;
    }

    Ok(slide)
}

fn parse_number<T: std::str::FromStr>(
    slide: usize,
    what: &'static str,
    value: &str,
) -> Result<T, TemplateError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| TemplateError::MalformedNumber {
            slide,
            what,
            value: value.to_string(),
        })
}

fn parse_rect(slide: usize, value: &str) -> Result<MotionRect, TemplateError> {
    MotionRect::parse(value).map_err(|_| TemplateError::MalformedNumber {
        slide,
        what: "motion rectangle",
        value: value.to_string(),
    })
}

fn resolve_paths(mut slide: Slide, base_dir: &Path) -> Slide {
    slide.image = base_dir.join(&slide.image);
    for track in &mut slide.audio_tracks {
        track.path = base_dir.join(&track.path);
    }
    slide
}
