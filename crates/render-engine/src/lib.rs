//! Storyreel Render Engine
//!
//! Turns a validated slideshow into a single video by driving an external
//! encoder. Every encoder invocation is a blocking subprocess; the engine
//! schedules them on a bounded pool.
//!
//! # Pipeline Architecture
//!
//! ```text
//! slideshow ──┐
//!             ├── Strategy selection (encoder version probe)
//!             │
//!             ├── Clip render (motion + audio fragment), one per slide
//!             │        temp0-N.mp4 … temp{N-1}-N.mp4
//!             │                 │
//!             │                 ▼
//!             ├── Merge tree (crossfade, halves in parallel)
//!             │        merged{anchor}-{depth}.mp4
//!             │                 │
//!             │                 ▼
//!             ├── Audio sync (strip, mux timeline, trim)
//!             │        video_with_no_audio.mp4 → merged_video.mp4 → final.mp4
//!             │                 │
//!             ▼                 ▼
//!                        <output>/<name>.mp4
//! ```

pub mod artifacts;
pub mod audio;
pub mod clip;
pub mod compare;
pub mod dry_run;
pub mod encoder;
pub mod export;
pub mod filter_graph;
pub mod merge;
pub mod motion;
pub mod progress;
pub mod strategy;

pub use dry_run::DryRunEncoder;
pub use encoder::{Encoder, EncoderJob, FfmpegEncoder};
pub use export::*;
pub use progress::{ProgressCallback, RenderProgress, RenderStage};
pub use strategy::{EncoderVersion, RenderStrategy};
