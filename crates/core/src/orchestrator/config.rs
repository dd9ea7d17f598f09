//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Queue sizing for batches, the `[queue]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrent conversions for image batches.
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,

    /// Concurrent conversions when the batch targets a video format.
    /// Video encodes are heavy enough that one at a time is usually best.
    #[serde(default = "default_video_concurrency")]
    pub video_concurrency: usize,
}

fn default_image_concurrency() -> usize {
    8
}

fn default_video_concurrency() -> usize {
    1
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            image_concurrency: default_image_concurrency(),
            video_concurrency: default_video_concurrency(),
        }
    }
}

impl OrchestratorConfig {
    /// Same concurrency for every batch.
    pub fn fixed(concurrency: usize) -> Self {
        Self {
            image_concurrency: concurrency,
            video_concurrency: concurrency,
        }
    }

    pub fn concurrency_for(&self, video: bool) -> usize {
        let c = if video {
            self.video_concurrency
        } else {
            self.image_concurrency
        };
        c.max(1)
    }
}
