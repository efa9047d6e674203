//! Storyreel Project Model
//!
//! Defines the data contracts for Storyreel slideshows:
//! - **Motion:** normalized pan/zoom rectangles
//! - **Slide:** image, audio tracks, transition, display duration, motion
//! - **Slideshow:** ordered slides plus output name, with validation
//! - **Template:** loading `.slideshow` XML and JSON templates
//!
//! Rectangle coordinates are normalized to `[0.0, 1.0]` relative to the
//! slide image so templates are independent of image resolution.

pub mod motion;
pub mod slide;
pub mod slideshow;
pub mod template;

pub use motion::*;
pub use slide::*;
pub use slideshow::*;
pub use template::*;
