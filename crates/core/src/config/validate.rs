use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - source root and uploader library dir are set (enforced by serde)
/// - worker pool sizes are non-zero
/// - extraction estimate factor is at least 1.0
/// - pause threshold is a fraction
/// - a configured disk ceiling is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.max_parallel_merges == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.max_parallel_merges cannot be 0".to_string(),
        ));
    }
    if config.pipeline.max_parallel_uploads == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.max_parallel_uploads cannot be 0".to_string(),
        ));
    }
    if config.orchestrator.max_concurrent_downloads == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_concurrent_downloads cannot be 0".to_string(),
        ));
    }
    if config.orchestrator.extract_size_factor < 1.0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.extract_size_factor cannot be below 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.orchestrator.pause_failure_threshold) {
        return Err(ConfigError::ValidationError(
            "orchestrator.pause_failure_threshold must be between 0.0 and 1.0".to_string(),
        ));
    }
    if config.budget.ceiling_bytes == Some(0) {
        return Err(ConfigError::ValidationError(
            "budget.ceiling_bytes cannot be 0; omit it for unlimited".to_string(),
        ));
    }
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts cannot be 0".to_string(),
        ));
    }

    Ok(())
}
