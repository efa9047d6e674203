//! Pan/zoom rectangles for Ken-Burns motion.
//!
//! All coordinates are normalized to `[0.0, 1.0]` relative to the image extent.

use serde::{Deserialize, Serialize};
use storyreel_common::{StoryreelError, StoryreelResult};

/// A rectangular viewport within a slide image.
///
/// `(0.0, 0.0)` is top-left, `(1.0, 1.0)` is bottom-right of the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRect {
    /// Left edge (normalized).
    pub x: f64,
    /// Top edge (normalized).
    pub y: f64,
    /// Width (normalized).
    pub w: f64,
    /// Height (normalized).
    pub h: f64,
}

impl MotionRect {
    /// The whole image (no zoom).
    pub const FULL: MotionRect = MotionRect {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Parse the template form `"x y w h"`.
    ///
    /// Exactly four whitespace-separated finite numbers are required.
    pub fn parse(text: &str) -> StoryreelResult<Self> {
        let malformed = || StoryreelError::malformed("motion rectangle", text);

        let values = text
            .split_whitespace()
            .map(|part| part.parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(malformed)?;

        match values.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(malformed()),
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Whether the rectangle has positive extent.
    pub fn has_area(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    /// Whether the rectangle lies entirely inside the image.
    pub fn is_within_image(&self) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= 1.0 + 1e-9 && self.bottom() <= 1.0 + 1e-9
    }
}

impl Default for MotionRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl std::fmt::Display for MotionRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.w, self.h)
    }
}

/// Start and end viewport of a slide's pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    pub start: MotionRect,
    pub end: MotionRect,
}

impl Motion {
    pub fn new(start: MotionRect, end: MotionRect) -> Self {
        Self { start, end }
    }

    /// True when start and end frame the same region.
    pub fn is_static(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_four_numbers() {
        let rect = MotionRect::parse("0.282 0.088 0.718 0.717").unwrap();
        assert_eq!(rect, MotionRect::new(0.282, 0.088, 0.718, 0.717));
        assert!(rect.is_within_image());
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let rect = MotionRect::parse("  0 0\t1   1 ").unwrap();
        assert_eq!(rect, MotionRect::FULL);
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!(matches!(
            MotionRect::parse("0 0 1"),
            Err(StoryreelError::MalformedNumber { .. })
        ));
        assert!(MotionRect::parse("0 0 1 1 1").is_err());
        assert!(MotionRect::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_non_numbers() {
        assert!(MotionRect::parse("0 0 one 1").is_err());
        assert!(MotionRect::parse("0 0 NaN 1").is_err());
    }

    #[test]
    fn test_default_motion_is_static_full_frame() {
        let motion = Motion::default();
        assert!(motion.is_static());
        assert_eq!(motion.start, MotionRect::FULL);
    }

    #[test]
    fn test_out_of_bounds_rect_detected() {
        let rect = MotionRect::new(0.6, 0.0, 0.5, 1.0);
        assert!(!rect.is_within_image());
        assert!(rect.has_area());
        assert!(!MotionRect::new(0.0, 0.0, 0.0, 1.0).has_area());
    }
}
