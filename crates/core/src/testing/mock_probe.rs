//! Mock media probe for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::converter::ConvertError;
use crate::probe::{MediaInfo, MediaProbe};

/// Scripted [`MediaProbe`]. Unknown paths are static and fail to probe.
#[derive(Debug, Default)]
pub struct MockProbe {
    animated: Mutex<HashMap<PathBuf, bool>>,
    infos: Mutex<HashMap<PathBuf, MediaInfo>>,
    probed: Mutex<Vec<PathBuf>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_animated(&self, path: impl AsRef<Path>, animated: bool) {
        self.animated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), animated);
    }

    pub fn set_info(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.infos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Paths passed to `is_animated`, in call order.
    pub fn probed_paths(&self) -> Vec<PathBuf> {
        self.probed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConvertError> {
        self.infos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| ConvertError::probe(format!("no media info for {}", path.display())))
    }

    async fn is_animated(&self, path: &Path) -> bool {
        self.probed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        self.animated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(false)
    }
}
