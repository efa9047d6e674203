//! Motion compiler: pan/zoom rectangles to a `zoompan` filter sequence.
//!
//! Each axis (x, y, and the inverse-scale axis driven by rectangle width)
//! is a linear ramp over `floor(duration_ms / 40)` frames at 25 fps:
//!
//! ```text
//! value(on) = (start - inc) + inc * on,   inc = (end - start) / frames
//! ```

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_project_model::motion::Motion;

use crate::filter_graph::Filter;

/// Fixed frame rate of motion interpolation.
pub const MOTION_FPS: u32 = 25;

/// Milliseconds per motion frame.
pub const FRAME_INTERVAL_MS: u32 = 1000 / MOTION_FPS;

/// Width images are upscaled to before `zoompan` to reduce jitter.
const PRESCALE_WIDTH: u32 = 8000;

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    pub const LOW: Resolution = Resolution {
        width: 852,
        height: 480,
    };

    pub fn for_quality(low_quality: bool) -> Self {
        if low_quality {
            Self::LOW
        } else {
            Self::HD
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A linear ramp of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRamp {
    pub start: f64,
    pub end: f64,
    pub increment: f64,
}

impl AxisRamp {
    fn new(start: f64, end: f64, divisor: u32) -> Self {
        Self {
            start,
            end,
            increment: (end - start) / f64::from(divisor),
        }
    }

    /// Value at frame index 0 of the expression.
    pub fn anchor(&self) -> f64 {
        self.start - self.increment
    }

    fn sign(&self) -> char {
        if self.increment.is_sign_negative() {
            '-'
        } else {
            '+'
        }
    }

    fn magnitude(&self) -> f64 {
        self.increment.abs()
    }
}

/// Numeric description of a slide's motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPlan {
    /// `floor(duration_ms / 40)`; may be zero for sub-frame durations.
    pub frame_count: u32,
    pub x: AxisRamp,
    pub y: AxisRamp,
    /// Rectangle width; the zoom factor is its inverse.
    pub scale: AxisRamp,
}

/// Number of motion frames in `duration_ms`.
pub fn frame_count(duration_ms: u32) -> u32 {
    duration_ms / FRAME_INTERVAL_MS
}

/// Compute the per-axis ramps for a slide.
///
/// A zero duration is rejected. Durations shorter than one frame divide by
/// one instead of zero.
pub fn plan_motion(motion: &Motion, duration_ms: u32) -> StoryreelResult<MotionPlan> {
    if duration_ms == 0 {
        return Err(StoryreelError::validation(
            "motion duration must be greater than zero",
        ));
    }

    let frames = frame_count(duration_ms);
    let divisor = frames.max(1);
    let (start, end) = (motion.start, motion.end);

    Ok(MotionPlan {
        frame_count: frames,
        x: AxisRamp::new(start.x, end.x, divisor),
        y: AxisRamp::new(start.y, end.y, divisor),
        scale: AxisRamp::new(start.w, end.w, divisor),
    })
}

impl MotionPlan {
    pub fn zoom_expr(&self) -> String {
        format!(
            "1/(({:.6}){}({:.6})*on)",
            self.scale.anchor(),
            self.scale.sign(),
            self.scale.magnitude()
        )
    }

    pub fn x_expr(&self) -> String {
        format!(
            "{:.6}*iw{}{:.6}*iw*on",
            self.x.anchor(),
            self.x.sign(),
            self.x.magnitude()
        )
    }

    pub fn y_expr(&self) -> String {
        format!(
            "{:.6}*ih{}{:.6}*ih*on",
            self.y.anchor(),
            self.y.sign(),
            self.y.magnitude()
        )
    }

    /// Filter sequence: prescale, zoompan, scale to output, square pixels.
    pub fn filters(&self, resolution: Resolution) -> Vec<Filter> {
        vec![
            Filter::new("scale").arg(PRESCALE_WIDTH).arg(-1),
            Filter::new("zoompan")
                .expr("z", self.zoom_expr())
                .expr("x", self.x_expr())
                .expr("y", self.y_expr())
                .opt("d", self.frame_count.max(1))
                .opt("fps", MOTION_FPS),
            Filter::new("scale")
                .arg(resolution.width)
                .arg(resolution.height),
            Filter::new("setsar").arg(1).arg(1),
        ]
    }
}

/// Compile a slide's motion into its filter sequence.
pub fn compile_motion(
    motion: &Motion,
    duration_ms: u32,
    resolution: Resolution,
) -> StoryreelResult<Vec<Filter>> {
    Ok(plan_motion(motion, duration_ms)?.filters(resolution))
}

/// The compiled motion as a single filter-chain string.
pub fn motion_expression(
    motion: &Motion,
    duration_ms: u32,
    resolution: Resolution,
) -> StoryreelResult<String> {
    let filters = compile_motion(motion, duration_ms, resolution)?;
    Ok(filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_project_model::motion::MotionRect;

    #[test]
    fn test_full_frame_is_no_op() {
        let expr = motion_expression(&Motion::default(), 5000, Resolution::HD).unwrap();
        assert_eq!(
            expr,
            "scale=8000:-1,\
             zoompan=z='1/((1.000000)+(0.000000)*on)':\
             x='0.000000*iw+0.000000*iw*on':\
             y='0.000000*ih+0.000000*ih*on':d=125:fps=25,\
             scale=1280:720,setsar=1:1"
        );
    }

    #[test]
    fn test_no_op_for_any_duration() {
        for duration in [1, 39, 40, 9400, 60_000] {
            let plan = plan_motion(&Motion::default(), duration).unwrap();
            assert_eq!(plan.x.increment, 0.0);
            assert_eq!(plan.y.increment, 0.0);
            assert_eq!(plan.scale.increment, 0.0);
        }
    }

    #[test]
    fn test_documented_ramp() {
        let motion = Motion::new(
            MotionRect::new(0.282, 0.088, 0.718, 0.717),
            MotionRect::new(0.391, 0.115, 0.475, 0.478),
        );
        let plan = plan_motion(&motion, 9400).unwrap();

        assert_eq!(plan.frame_count, 235);
        assert!((plan.scale.increment - (0.475 - 0.718) / 235.0).abs() < 1e-15);
        assert!((plan.scale.increment + 0.001034).abs() < 1e-6);

        assert_eq!(plan.zoom_expr(), "1/((0.719034)-(0.001034)*on)");
        assert_eq!(plan.x_expr(), "0.281536*iw+0.000464*iw*on");
        assert_eq!(plan.y_expr(), "0.087885*ih+0.000115*ih*on");
    }

    #[test]
    fn test_low_quality_scale() {
        let expr = motion_expression(&Motion::default(), 5000, Resolution::LOW).unwrap();
        assert!(expr.ends_with("scale=852:480,setsar=1:1"));
    }

    #[test]
    fn test_ramp_reaches_end_value() {
        let motion = Motion::new(MotionRect::FULL, MotionRect::new(0.25, 0.25, 0.5, 0.5));
        let plan = plan_motion(&motion, 4000).unwrap();
        let frames = f64::from(plan.frame_count);
        let at_end = plan.scale.anchor() + plan.scale.increment * (frames + 1.0);
        assert!((at_end - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_rejected_and_sub_frame_compiles() {
        assert!(matches!(
            plan_motion(&Motion::default(), 0),
            Err(StoryreelError::Validation { .. })
        ));
        let plan = plan_motion(&Motion::default(), 20).unwrap();
        assert_eq!(plan.frame_count, 0);
        let expr = motion_expression(&Motion::default(), 20, Resolution::HD).unwrap();
        assert!(expr.contains(":d=1:"));
    }
}
