//! Testing utilities and mock implementations.
//!
//! Mocks stand in for every external tool seam, so handlers, the queue and
//! the orchestrator can be exercised without ffmpeg or any image tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{mock_services, MockBehavior};
//!
//! let (services, mocks) = mock_services(temp_dir);
//! mocks.raster.set_behavior(MockBehavior::Fail("corrupt".into()));
//! mocks.probe.set_animated("clip.gif", true);
//! ```

mod mock_backend;
mod mock_host;
mod mock_probe;

pub use mock_backend::{MockBackend, MockBackends, MockBehavior};
pub use mock_host::MockHost;
pub use mock_probe::MockProbe;

use std::path::PathBuf;
use std::sync::Arc;

use crate::converter::BackendSet;
use crate::handler::ConversionServices;

/// A [`BackendSet`] made of fresh mocks, plus handles to script them.
pub fn mock_backends() -> (BackendSet, MockBackends) {
    let mocks = MockBackends::new();
    let set = BackendSet::new(
        mocks.transcode.clone(),
        mocks.raster.clone(),
        mocks.vector.clone(),
        mocks.heic.clone(),
        mocks.jxl.clone(),
    );
    (set, mocks)
}

/// [`ConversionServices`] over mock backends and the mock probe.
pub fn mock_services(temp_dir: PathBuf) -> (ConversionServices, MockBackends) {
    let (backends, mocks) = mock_backends();
    let services = ConversionServices::new(backends, mocks.probe.clone(), temp_dir);
    (services, mocks)
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Writes a placeholder source file and returns its path.
    pub fn source_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, format!("source {name}"));
        path
    }

    /// Writes a real `width`x`height` PNG.
    pub fn png_file(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let _ = img.save(&path);
        path
    }
}
