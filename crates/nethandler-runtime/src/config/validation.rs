//! Configuration validation utilities.

use tracing_subscriber::filter::Directive;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, NetHandlerConfig};

/// Validates the entire configuration.
///
/// Every dispatch setting is valid by construction, so only logging is checked.
pub fn validate_config(config: &NetHandlerConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(path) = &logging.file_path
        && path.file_name().is_none()
    {
        return Err(ConfigError::validation(format!(
            "Log file path must name a file: {}",
            path.display()
        )));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    for (module, level) in &logging.filters {
        let directive = format!("{module}={level}");
        let malformed_target = module.is_empty()
            || module.contains(|c: char| c.is_whitespace() || c == '=' || c == ',');
        if malformed_target || directive.parse::<Directive>().is_err() {
            return Err(ConfigError::validation(format!(
                "Invalid log filter directive: {directive}"
            )));
        }
    }

    Ok(())
}
