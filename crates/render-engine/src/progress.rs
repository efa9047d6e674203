//! Render progress reporting.

use std::sync::Arc;

/// Progress callback. Called from whichever task finished a unit of work.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// A progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    pub stage: RenderStage,
    /// Units finished in this stage.
    pub completed: usize,
    /// Units in this stage.
    pub total: usize,
}

impl RenderProgress {
    /// Completed share of the current stage in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Stages of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Probing,
    RenderingClips,
    Compositing,
    SyncingAudio,
    Finalizing,
    Complete,
}

impl RenderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Probing => "probing encoder",
            Self::RenderingClips => "rendering clips",
            Self::Compositing => "compositing",
            Self::SyncingAudio => "syncing audio",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
        }
    }
}

pub(crate) fn report(
    progress: Option<&ProgressCallback>,
    stage: RenderStage,
    completed: usize,
    total: usize,
) {
    if let Some(cb) = progress {
        cb(RenderProgress {
            stage,
            completed,
            total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fraction() {
        let p = RenderProgress {
            stage: RenderStage::Compositing,
            completed: 3,
            total: 7,
        };
        assert!((p.fraction() - 3.0 / 7.0).abs() < 1e-9);

        let empty = RenderProgress {
            stage: RenderStage::Compositing,
            completed: 0,
            total: 0,
        };
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_report_without_callback_is_silent() {
        report(None, RenderStage::Probing, 0, 1);

        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let cb: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p.stage));
        report(Some(&cb), RenderStage::Finalizing, 1, 1);
        assert_eq!(*seen.lock().unwrap(), vec![RenderStage::Finalizing]);
    }
}
