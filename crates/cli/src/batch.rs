//! Batch files: the TOML list of tasks the CLI runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use convertino_core::BatchTask;

#[derive(Debug, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub tasks: Vec<BatchTask>,
}

impl BatchFile {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid batch file")
    }

    /// Reads a batch file. Relative source and output paths are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file {:?}", path))?;
        let mut batch = Self::parse(&contents)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        batch.resolve_relative(base);
        Ok(batch)
    }

    fn resolve_relative(&mut self, base: &Path) {
        for task in &mut self.tasks {
            task.src = absolutize(base, &task.src);
            if let Some(output) = task.options.output.take() {
                task.options.output = Some(absolutize(base, &output));
            }
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
