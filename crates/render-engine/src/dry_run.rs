//! An encoder that plans instead of encoding.
//!
//! [`DryRunEncoder`] records every job it is given and answers duration
//! probes from the durations the planner attached to those jobs. It backs
//! `storyreel render --dry-run` and the engine's tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::encoder::{Encoder, EncoderJob};

/// Banner reported unless another one is configured.
pub const DEFAULT_DRY_RUN_BANNER: &str =
    "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers";

/// A job as the dry-run encoder saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedJob {
    pub label: String,
    pub output: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Default)]
struct DryRunState {
    jobs: Vec<RecordedJob>,
    durations: HashMap<PathBuf, f64>,
}

/// Records jobs and fabricates probe answers.
#[derive(Debug)]
pub struct DryRunEncoder {
    banner: String,
    rounding_offset_secs: f64,
    audio_drift_secs: f64,
    state: Mutex<DryRunState>,
}

impl Default for DryRunEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunEncoder {
    pub fn new() -> Self {
        Self {
            banner: DEFAULT_DRY_RUN_BANNER.to_string(),
            rounding_offset_secs: 0.0,
            audio_drift_secs: 0.0,
            state: Mutex::new(DryRunState::default()),
        }
    }

    /// Report a different `-version` banner.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Add a fixed offset to every produced duration, as encoder rounding would.
    pub fn with_rounding_offset(mut self, secs: f64) -> Self {
        self.rounding_offset_secs = secs;
        self
    }

    /// Make every audio stream this much longer than its video.
    pub fn with_audio_drift(mut self, secs: f64) -> Self {
        self.audio_drift_secs = secs;
        self
    }

    /// Jobs in the order they were run.
    pub fn jobs(&self) -> Vec<RecordedJob> {
        self.lock().map(|s| s.jobs.clone()).unwrap_or_default()
    }

    /// Printable plan: one shell-like line per job.
    pub fn plan(&self) -> Vec<String> {
        self.jobs()
            .into_iter()
            .map(|job| {
                let args: Vec<String> = job.args.iter().map(|a| shell_quote(a)).collect();
                format!("# {}\nffmpeg {}", job.label, args.join(" "))
            })
            .collect()
    }

    fn lock(&self) -> StoryreelResult<std::sync::MutexGuard<'_, DryRunState>> {
        self.state
            .lock()
            .map_err(|_| StoryreelError::render("dry-run encoder state poisoned"))
    }
}

impl Encoder for DryRunEncoder {
    fn run(&self, job: &EncoderJob) -> StoryreelResult<()> {
        let args = job.to_args()?;
        tracing::debug!(label = %job.label, args = ?args, "Dry-run encoder job");

        let mut state = self.lock()?;
        if let Some(expected) = job.expected_duration_secs {
            let produced = (expected + self.rounding_offset_secs).max(0.0);
            state.durations.insert(job.output.clone(), produced);
        }
        state.jobs.push(RecordedJob {
            label: job.label.clone(),
            output: job.output.clone(),
            args,
        });
        Ok(())
    }

    fn probe_duration(&self, path: &Path) -> StoryreelResult<f64> {
        self.lock()?
            .durations
            .get(path)
            .copied()
            .ok_or_else(|| StoryreelError::FileNotFound {
                path: path.to_path_buf(),
            })
    }

    fn probe_audio_duration(&self, path: &Path) -> StoryreelResult<Option<f64>> {
        let video = self.probe_duration(path)?;
        Ok(Some(video + self.audio_drift_secs))
    }

    fn version_banner(&self) -> StoryreelResult<String> {
        Ok(self.banner.clone())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MediaInput;

    #[test]
    fn test_probe_answers_from_recorded_job() {
        let encoder = DryRunEncoder::new().with_rounding_offset(0.04);
        let job = EncoderJob::new("clip 0", "/tmp/dry/temp0-1.mp4")
            .input(MediaInput::looped_image("a.jpg", 5000))
            .expect_duration(5.0);
        encoder.run(&job).unwrap();

        let probed = encoder.probe_duration(Path::new("/tmp/dry/temp0-1.mp4")).unwrap();
        assert!((probed - 5.04).abs() < 1e-9);
        assert_eq!(encoder.jobs().len(), 1);
    }

    #[test]
    fn test_unknown_artifact_is_not_found() {
        let encoder = DryRunEncoder::new();
        assert!(matches!(
            encoder.probe_duration(Path::new("/tmp/dry/none.mp4")),
            Err(StoryreelError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_audio_drift() {
        let encoder = DryRunEncoder::new().with_audio_drift(1.5);
        let job = EncoderJob::new("x", "/tmp/dry/x.mp4").expect_duration(9.0);
        encoder.run(&job).unwrap();
        let audio = encoder
            .probe_audio_duration(Path::new("/tmp/dry/x.mp4"))
            .unwrap()
            .unwrap();
        assert!((audio - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_plan_quotes_filter_graphs() {
        assert_eq!(shell_quote("[0:v]null[v]"), "'[0:v]null[v]'");
        assert_eq!(shell_quote("-c:v"), "-c:v");
    }
}
