//! Exit-status classification for the transcoding engine.

use crate::converter::ConvertError;

const OUTPUT_OPEN_FAILURE: &str = "Could not open file";
const INVALID_INPUT: &str = "Invalid data found when processing input";

/// How an external process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// A missing code or the conventional SIGINT/SIGTERM exit codes.
    pub fn was_cancelled(&self) -> bool {
        matches!(self.code, None | Some(130) | Some(143))
    }
}

/// Maps an exit to the engine's error contract.
pub fn classify_exit(tool: &str, exit: &ProcessExit) -> Result<(), ConvertError> {
    if exit.success() {
        return Ok(());
    }
    if exit.was_cancelled() {
        return Err(ConvertError::Cancelled);
    }
    if exit.stderr.contains(OUTPUT_OPEN_FAILURE) {
        return Err(ConvertError::OutputPathCouldNotOpen);
    }
    if exit.stderr.contains(INVALID_INPUT) {
        return Err(ConvertError::InvalidInputData);
    }
    Err(ConvertError::external_tool(tool, exit.code, exit.stderr.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(code: Option<i32>, stderr: &str) -> ProcessExit {
        ProcessExit {
            code,
            stdout: Vec::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_success() {
        assert!(classify_exit("ffmpeg", &exit(Some(0), "noise")).is_ok());
    }

    #[test]
    fn test_cancel_codes() {
        for code in [None, Some(130), Some(143)] {
            assert!(matches!(
                classify_exit("ffmpeg", &exit(code, "")),
                Err(ConvertError::Cancelled)
            ));
        }
    }

    #[test]
    fn test_recognized_diagnostics() {
        assert!(matches!(
            classify_exit("ffmpeg", &exit(Some(1), "[out] Could not open file : /x.jpg")),
            Err(ConvertError::OutputPathCouldNotOpen)
        ));
        assert!(matches!(
            classify_exit("ffmpeg", &exit(Some(1), "in.png: Invalid data found when processing input")),
            Err(ConvertError::InvalidInputData)
        ));
    }

    #[test]
    fn test_other_failures_keep_stderr() {
        match classify_exit("ffmpeg", &exit(Some(69), "Unknown encoder 'libfoo'\n")) {
            Err(ConvertError::ExternalToolFailure { tool, code, stderr }) => {
                assert_eq!(tool, "ffmpeg");
                assert_eq!(code, Some(69));
                assert_eq!(stderr, "Unknown encoder 'libfoo'");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
