//! Mock host library for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::host::{HostError, HostItem, HostLibrary};

/// In-memory [`HostLibrary`] with a scripted replace result.
#[derive(Debug)]
pub struct MockHost {
    items: Mutex<Vec<HostItem>>,
    /// `Some(reason)` makes every replace fail with that reason.
    replace_error: Mutex<Option<String>>,
    replace_accepts: Mutex<bool>,
    replaced: Mutex<Vec<(String, PathBuf)>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            replace_error: Mutex::new(None),
            replace_accepts: Mutex::new(true),
            replaced: Mutex::new(Vec::new()),
        }
    }

    pub fn add_item(&self, id: &str, file_path: impl Into<PathBuf>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HostItem {
                id: id.to_string(),
                file_path: file_path.into(),
            });
    }

    pub fn fail_replace(&self, reason: &str) {
        *self.replace_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }

    /// Makes replace return `Ok(false)`.
    pub fn decline_replace(&self) {
        *self.replace_accepts.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// `(item id, new path)` of every accepted replace.
    pub fn replaced(&self) -> Vec<(String, PathBuf)> {
        self.replaced.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl HostLibrary for MockHost {
    async fn find_item_by_path(&self, path: &Path) -> Result<Option<HostItem>, HostError> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.file_path == path)
            .cloned())
    }

    async fn replace_file(&self, item: &HostItem, new_path: &Path) -> Result<bool, HostError> {
        if let Some(reason) = self.replace_error.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(HostError::ReplaceFailed {
                item_id: item.id.clone(),
                reason,
            });
        }
        if !*self.replace_accepts.lock().unwrap_or_else(PoisonError::into_inner) {
            return Ok(false);
        }
        self.replaced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((item.id.clone(), new_path.to_path_buf()));
        Ok(true)
    }
}
