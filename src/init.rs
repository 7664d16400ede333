//! Initialization helpers for the application startup.

use crate::config::LoggingConfig;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.level.clone();

        // Suppress hickory logs unless explicitly enabled/overridden
        for noisy in ["hickory_server", "hickory_proto", "hickory_resolver"] {
            if !filter.contains(noisy) {
                filter.push_str(&format!(",{}=off", noisy));
            }
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
