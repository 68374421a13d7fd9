use config::LoggingConfig;

/// `EnvFilter` directive: the base level followed by per-module overrides
pub fn filter_directive(logging_config: &LoggingConfig) -> String {
    let mut filter = logging_config.level.clone();

    let mut modules: Vec<_> = logging_config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        filter.push_str(&format!(",{module}={level}"));
    }

    filter
}

/// Installs the global subscriber; call once at startup
pub fn init_tracing(logging_config: &LoggingConfig) {
    let filter = filter_directive(logging_config);

    // Initialize tracing based on the format specified in config
    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
