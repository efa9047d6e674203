//! The boundary to the external encoder.
//!
//! Every piece of media is produced by an [`EncoderJob`] handed to an
//! [`Encoder`]. Jobs are blocking calls; async callers go through
//! [`run_and_probe`], which runs them on the blocking pool while holding a
//! concurrency permit.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use storyreel_common::config::EncoderConfig;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use tokio::sync::Semaphore;

use crate::filter_graph::FilterGraph;

/// One input stream of an encoder job.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaInput {
    /// A media file read as-is.
    File(PathBuf),
    /// A still image looped for a fixed duration.
    LoopedImage { path: PathBuf, duration_ms: u32 },
    /// A generated source (e.g. `anullsrc=r=44100:cl=stereo`).
    Lavfi(String),
}

impl MediaInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn looped_image(path: impl Into<PathBuf>, duration_ms: u32) -> Self {
        Self::LoopedImage {
            path: path.into(),
            duration_ms,
        }
    }

    pub fn lavfi(expr: impl Into<String>) -> Self {
        Self::Lavfi(expr.into())
    }

    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::File(path) => {
                args.push("-i".into());
                args.push(path.display().to_string());
            }
            Self::LoopedImage { path, duration_ms } => {
                args.extend(["-loop".into(), "1".into()]);
                args.extend(["-t".into(), format!("{duration_ms}ms")]);
                args.push("-i".into());
                args.push(path.display().to_string());
            }
            Self::Lavfi(expr) => {
                args.extend(["-f".into(), "lavfi".into(), "-i".into(), expr.clone()]);
            }
        }
    }
}

/// A single encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderJob {
    /// Short human-readable name used in logs and dry-run plans.
    pub label: String,

    pub inputs: Vec<MediaInput>,

    pub filter_graph: Option<FilterGraph>,

    /// Options placed between the filter graph and the output path.
    pub output_options: Vec<String>,

    pub output: PathBuf,

    /// Duration the planner expects the output to have.
    pub expected_duration_secs: Option<f64>,
}

impl EncoderJob {
    pub fn new(label: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            inputs: vec![],
            filter_graph: None,
            output_options: vec![],
            output: output.into(),
            expected_duration_secs: None,
        }
    }

    pub fn input(mut self, input: MediaInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn filter_graph(mut self, graph: FilterGraph) -> Self {
        self.filter_graph = Some(graph);
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options
            .extend(options.into_iter().map(Into::into));
        self
    }

    pub fn expect_duration(mut self, secs: f64) -> Self {
        self.expected_duration_secs = Some(secs);
        self
    }

    /// Full encoder argument list. The filter graph is validated and
    /// serialized here and nowhere else.
    pub fn to_args(&self) -> StoryreelResult<Vec<String>> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();

        for input in &self.inputs {
            input.push_args(&mut args);
        }

        if let Some(graph) = &self.filter_graph {
            graph.validate()?;
            args.push("-filter_complex".into());
            args.push(graph.to_string());
        }

        args.extend(self.output_options.iter().cloned());
        args.push(self.output.display().to_string());
        Ok(args)
    }
}

/// The external encoding service.
pub trait Encoder: Send + Sync {
    /// Run a job to completion. A non-zero exit is an error carrying the
    /// encoder's diagnostics verbatim.
    fn run(&self, job: &EncoderJob) -> StoryreelResult<()>;

    /// Container duration of a media file, in seconds.
    fn probe_duration(&self, path: &Path) -> StoryreelResult<f64>;

    /// Duration of the first audio stream, if the file has one.
    fn probe_audio_duration(&self, path: &Path) -> StoryreelResult<Option<f64>>;

    /// Free-text version banner (`ffmpeg -version`).
    fn version_banner(&self) -> StoryreelResult<String>;

    fn name(&self) -> &str;
}

/// Encoder backed by the `ffmpeg` and `ffprobe` programs.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(&config.ffmpeg, &config.ffprobe)
    }

    /// Whether the ffmpeg program can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn program_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    fn ffprobe_field(&self, path: &Path, select: &[&str], entry: &str) -> StoryreelResult<String> {
        let program = Self::program_name(&self.ffprobe);
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error"])
            .args(select)
            .args(["-show_entries", entry])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let output = cmd
            .output()
            .map_err(|e| StoryreelError::spawn(&program, e.to_string()))?;

        if !output.status.success() {
            return Err(StoryreelError::encoder(
                program,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Encoder for FfmpegEncoder {
    fn run(&self, job: &EncoderJob) -> StoryreelResult<()> {
        let args = job.to_args()?;
        let program = Self::program_name(&self.ffmpeg);
        tracing::debug!(label = %job.label, args = ?args, "Running encoder");

        let started = std::time::Instant::now();
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| StoryreelError::spawn(&program, e.to_string()))?;

        if !output.status.success() {
            return Err(StoryreelError::encoder(
                program,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        tracing::debug!(
            label = %job.label,
            output = %job.output.display(),
            elapsed_ms = started.elapsed().as_millis(),
            "Encoder job finished"
        );
        Ok(())
    }

    fn probe_duration(&self, path: &Path) -> StoryreelResult<f64> {
        let raw = self.ffprobe_field(path, &[], "format=duration")?;
        parse_duration(&raw)
    }

    fn probe_audio_duration(&self, path: &Path) -> StoryreelResult<Option<f64>> {
        let raw = self.ffprobe_field(path, &["-select_streams", "a:0"], "stream=duration")?;
        let first = raw.lines().next().unwrap_or("").trim();
        if first.is_empty() || first == "N/A" {
            return Ok(None);
        }
        parse_duration(first).map(Some)
    }

    fn version_banner(&self) -> StoryreelResult<String> {
        let program = Self::program_name(&self.ffmpeg);
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map_err(|e| StoryreelError::spawn(&program, e.to_string()))?;

        if !output.status.success() {
            return Err(StoryreelError::encoder(
                program,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Parse a probe's decimal-seconds answer.
pub fn parse_duration(raw: &str) -> StoryreelResult<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| StoryreelError::malformed("duration", trimmed))
}

/// An artifact written by a finished job, with its measured durations.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedArtifact {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub audio_duration_secs: Option<f64>,
}

/// Run `job` on the blocking pool, then measure what it produced.
///
/// A permit from `limiter` is held for exactly this call, never across
/// awaits on other work, so nested callers cannot starve each other.
pub async fn run_and_probe(
    encoder: Arc<dyn Encoder>,
    limiter: Arc<Semaphore>,
    job: EncoderJob,
) -> StoryreelResult<ProducedArtifact> {
    let permit = limiter
        .acquire_owned()
        .await
        .map_err(|e| StoryreelError::render(format!("Encoder limiter closed: {e}")))?;

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        encoder.run(&job)?;
        let duration_secs = encoder.probe_duration(&job.output)?;
        let audio_duration_secs = encoder.probe_audio_duration(&job.output)?;
        Ok(ProducedArtifact {
            path: job.output,
            duration_secs,
            audio_duration_secs,
        })
    })
    .await
    .map_err(|e| StoryreelError::render(format!("Encoder task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_graph::{Filter, FilterChain};

    #[test]
    fn test_job_args_order() {
        let job = EncoderJob::new("clip 0", "/tmp/t/temp0-2.mp4")
            .input(MediaInput::looped_image("/img/a.jpg", 5000))
            .input(MediaInput::lavfi("anullsrc=r=44100:cl=stereo"))
            .filter_graph(FilterGraph::new().chain(
                FilterChain::new()
                    .input("0:v")
                    .filter(Filter::new("format").arg("yuv420p"))
                    .output("v"),
            ))
            .options(["-map", "[v]", "-map", "1:a"]);

        let args = job.to_args().unwrap();
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-loglevel", "error",
                "-loop", "1", "-t", "5000ms", "-i", "/img/a.jpg",
                "-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo",
                "-filter_complex", "[0:v]format=yuv420p[v]",
                "-map", "[v]", "-map", "1:a",
                "/tmp/t/temp0-2.mp4",
            ]
        );
    }

    #[test]
    fn test_invalid_graph_fails_before_encoding() {
        let job = EncoderJob::new("broken", "/tmp/out.mp4")
            .input(MediaInput::file("/tmp/in.mp4"))
            .filter_graph(FilterGraph::new());
        assert!(job.to_args().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert!((parse_duration("33.040000\n").unwrap() - 33.04).abs() < 1e-9);
        assert!(matches!(
            parse_duration("N/A"),
            Err(StoryreelError::MalformedNumber { .. })
        ));
        assert!(parse_duration("-1").is_err());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let encoder = FfmpegEncoder::new(
            "/nonexistent/storyreel/ffmpeg",
            "/nonexistent/storyreel/ffprobe",
        );
        assert!(!encoder.is_available());
        assert!(matches!(
            encoder.version_banner(),
            Err(StoryreelError::Spawn { .. })
        ));
        assert!(matches!(
            encoder.probe_duration(Path::new("/tmp/x.mp4")),
            Err(StoryreelError::Spawn { .. })
        ));
    }
}
