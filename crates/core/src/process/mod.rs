//! External process lifecycle.
//!
//! Every tool the engine runs (ffmpeg, ffprobe, the HEIC/JXL/SVG decoders)
//! goes through [`ProcessRegistry`], which tracks live processes and can stop
//! them one by one or all at once.

mod exit;
mod registry;

pub use exit::{classify_exit, ProcessExit};
pub use registry::{
    ProcessHandle, ProcessInfo, ProcessRegistry, ProcessSpec, ProcessTerminator,
    DEFAULT_GRACE_PERIOD,
};
