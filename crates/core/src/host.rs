//! The host application's media library, used by replace mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A library entry backed by a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostItem {
    pub id: String,
    pub file_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host library unavailable: {0}")]
    Unavailable(String),

    #[error("replace failed for item {item_id}: {reason}")]
    ReplaceFailed { item_id: String, reason: String },
}

#[async_trait]
pub trait HostLibrary: Send + Sync {
    async fn find_item_by_path(&self, path: &Path) -> Result<Option<HostItem>, HostError>;

    /// Swaps the item's file for `new_path`. `Ok(false)` means the host
    /// declined without an error.
    async fn replace_file(&self, item: &HostItem, new_path: &Path) -> Result<bool, HostError>;
}

/// No library: lookups find nothing, so replace mode does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

#[async_trait]
impl HostLibrary for NoopHost {
    async fn find_item_by_path(&self, _path: &Path) -> Result<Option<HostItem>, HostError> {
        Ok(None)
    }

    async fn replace_file(&self, _item: &HostItem, _new_path: &Path) -> Result<bool, HostError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_noop_host_finds_nothing() {
        let host = NoopHost;
        assert_eq!(block_on(host.find_item_by_path(Path::new("/library/a.png"))).unwrap(), None);
    }

    #[test]
    fn test_noop_host_declines_replace() {
        let item = HostItem {
            id: "item-1".to_string(),
            file_path: PathBuf::from("/library/a.png"),
        };
        assert!(!block_on(NoopHost.replace_file(&item, Path::new("/out/a.jpg"))).unwrap());
    }

    #[test]
    fn test_host_error_display() {
        let err = HostError::ReplaceFailed {
            item_id: "item-1".to_string(),
            reason: "locked".to_string(),
        };
        assert_eq!(err.to_string(), "replace failed for item item-1: locked");
    }
}
