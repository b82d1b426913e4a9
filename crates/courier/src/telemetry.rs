use crate::{LogFormat, LoggingConfig};
use courier_error::ConfigError;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when it is set. Fails if the filter
/// does not parse or a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter())
            .map_err(|e| ConfigError::new(format!("Invalid log filter: {}", e)))?,
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format() {
        LogFormat::Pretty => subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.map_err(|e| ConfigError::new(format!("Failed to install subscriber: {}", e)))?;

    info!(format = %config.format(), "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_rejected() {
        // Only reached when RUST_LOG is unset; otherwise the env filter wins.
        if std::env::var_os("RUST_LOG").is_none() {
            let config = LoggingConfig::new(LogFormat::Json, "courier=verbose");
            assert!(init_tracing(&config).is_err());
        }
    }
}
