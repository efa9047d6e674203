//! Temporary artifact naming.
//!
//! Concurrent writers never share a path: leaf clips are keyed by
//! `(index, total)`, merges by `(anchor, depth)`.

use std::path::{Path, PathBuf};

use storyreel_common::clock::RenderClock;

/// Names of every intermediate file inside one render's temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempLayout {
    root: PathBuf,
}

impl TempLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<system temp>/storyreel-<timestamp>-<pid>`.
    pub fn unique(clock: &RenderClock) -> Self {
        Self::new(std::env::temp_dir().join(format!(
            "storyreel-{}-{}",
            clock.stamp(),
            std::process::id()
        )))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rendered clip for slide `index` of `total`.
    pub fn clip(&self, index: usize, total: usize) -> PathBuf {
        self.root.join(format!("temp{index}-{total}.mp4"))
    }

    /// Result of a merge anchored at slide `anchor` at recursion `depth`.
    pub fn merge(&self, anchor: usize, depth: usize) -> PathBuf {
        self.root.join(format!("merged{anchor}-{depth}.mp4"))
    }

    /// Root composite with its audio stream dropped.
    pub fn silent_composite(&self) -> PathBuf {
        self.root.join("video_with_no_audio.mp4")
    }

    /// Silent composite muxed with the synchronized audio track.
    pub fn muxed(&self) -> PathBuf {
        self.root.join("merged_video.mp4")
    }

    /// Muxed video trimmed to the picture length.
    pub fn trimmed(&self) -> PathBuf {
        self.root.join("final.mp4")
    }

    pub fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Remove the directory and everything in it. Missing is fine.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Final location of a rendered slideshow.
pub fn output_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}.mp4"))
}
