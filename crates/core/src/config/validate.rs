use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Queue concurrency values are at least 1
/// - Kill grace period and output wait timeout are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.queue.image_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "queue.image_concurrency must be at least 1".to_string(),
        ));
    }
    if config.queue.video_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "queue.video_concurrency must be at least 1".to_string(),
        ));
    }

    if config.converter.kill_grace_period_ms == 0 {
        return Err(ConfigError::ValidationError(
            "converter.kill_grace_period_ms cannot be 0".to_string(),
        ));
    }
    if config.converter.output_wait_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "converter.output_wait_timeout_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
