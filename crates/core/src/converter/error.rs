//! Error types for the converter module.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::traits::BackendKind;

/// One failed attempt inside a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub backend: BackendKind,
    pub error: String,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

fn join_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while converting a single file.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A required input (source, destination, format, file name) is absent.
    #[error("Missing argument: {what}")]
    MissingArgument { what: &'static str },

    /// The target settings are inconsistent.
    #[error("Invalid target: {reason}")]
    InvalidSpec { reason: String },

    /// No handler or backend applies to the pair.
    #[error("No backend for {input}→{output}")]
    UnsupportedFormat { input: String, output: String },

    /// The output format is permanently disabled.
    #[error("Output to {format} is disabled")]
    OutputFormatDisabled { format: String },

    /// Every backend of a plan failed.
    #[error("All backends failed for {input}→{output}: {}", join_failures(.failures))]
    BackendExhausted {
        input: String,
        output: String,
        failures: Vec<BackendFailure>,
    },

    /// An external tool exited non-zero.
    #[error("{tool} exited with code {code:?}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The transcoding engine could not open the output path.
    #[error("Output path could not be opened")]
    OutputPathCouldNotOpen,

    /// The transcoding engine rejected the input bytes.
    #[error("Invalid data found when processing input")]
    InvalidInputData,

    /// The conversion was killed on request.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The output file is missing, too small, or never appeared.
    #[error("Output validation failed for {path}: {reason}")]
    OutputValidation { path: PathBuf, reason: String },

    /// An external binary could not be spawned.
    #[error("{tool} not found at path: {path}")]
    ToolNotFound { tool: String, path: PathBuf },

    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    #[error("Failed to encode image: {reason}")]
    Encode { reason: String },

    #[error("Failed to probe media file: {reason}")]
    Probe { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn unsupported(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    pub fn external_tool(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }

    pub fn decode(reason: impl fmt::Display) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn encode(reason: impl fmt::Display) -> Self {
        Self::Encode {
            reason: reason.to_string(),
        }
    }

    pub fn probe(reason: impl Into<String>) -> Self {
        Self::Probe {
            reason: reason.into(),
        }
    }

    /// Whether this error reports a caller-initiated kill.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Per-backend failures when a plan was exhausted.
    pub fn failures(&self) -> &[BackendFailure] {
        match self {
            Self::BackendExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}
