//! Post-conversion output checks.

use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::error::ConvertError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Waits for `path` to appear and checks it holds at least `min_size` bytes.
/// Returns the file size.
pub async fn validate_output_file(
    path: &Path,
    min_size: u64,
    timeout: Duration,
) -> Result<u64, ConvertError> {
    let deadline = Instant::now() + timeout;

    loop {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let size = meta.len();
                if size < min_size {
                    return Err(ConvertError::OutputValidation {
                        path: path.to_path_buf(),
                        reason: format!("file size {} is below the minimum of {}", size, min_size),
                    });
                }
                return Ok(size);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if Instant::now() >= deadline {
                    return Err(ConvertError::OutputValidation {
                        path: path.to_path_buf(),
                        reason: "output file was not created".to_string(),
                    });
                }
                sleep(POLL_INTERVAL).await;
            }
            Err(e) => return Err(ConvertError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_existing_file_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"data").unwrap();

        let size = validate_output_file(&path, 1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(size, 4);
    }

    #[tokio::test]
    async fn test_empty_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"").unwrap();

        let err = validate_output_file(&path, 1, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ConvertError::OutputValidation { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never.png");

        let start = std::time::Instant::now();
        let err = validate_output_file(&path, 1, Duration::from_millis(250)).await.unwrap_err();
        assert!(matches!(err, ConvertError::OutputValidation { .. }));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_late_file_is_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.png");
        let writer_path = path.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            tokio::fs::write(writer_path, b"x").await.unwrap();
        });

        assert_eq!(validate_output_file(&path, 1, Duration::from_secs(2)).await.unwrap(), 1);
    }
}
