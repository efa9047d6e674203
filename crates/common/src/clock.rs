//! Timing utilities for renders and duration bookkeeping.
//!
//! Slide timings are authored in milliseconds while the encoder reports
//! probed durations in fractional seconds. This module provides:
//! - A render clock anchored when a render starts
//! - Conversions between the two units
//! - Drift measurement between an expected and a probed duration

use std::time::Instant;

use chrono::{DateTime, Utc};

/// A clock anchored to the moment a render started.
#[derive(Debug, Clone)]
pub struct RenderClock {
    epoch: Instant,

    /// Wall-clock time at epoch.
    started_at: DateTime<Utc>,
}

impl RenderClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the render started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Compact UTC stamp suitable for directory names (`20261016T093000`).
    pub fn stamp(&self) -> String {
        self.started_at.format("%Y%m%dT%H%M%S").to_string()
    }
}

/// Convert milliseconds to seconds.
pub fn ms_to_secs(ms: u32) -> f64 {
    f64::from(ms) / 1000.0
}

/// Disagreement between a duration we expected and one we measured.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    pub expected_secs: f64,
    pub measured_secs: f64,
}

impl DriftMeasurement {
    pub fn new(expected_secs: f64, measured_secs: f64) -> Self {
        Self {
            expected_secs,
            measured_secs,
        }
    }

    /// Drift in seconds (positive = measured is longer).
    pub fn drift_secs(&self) -> f64 {
        self.measured_secs - self.expected_secs
    }

    /// Whether drift strictly exceeds the tolerance.
    pub fn exceeds_threshold(&self, tolerance_secs: f64) -> bool {
        self.drift_secs().abs() > tolerance_secs
    }
}
