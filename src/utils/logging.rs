use env_logger::Env;
use log::LevelFilter;

///
/// Initializes the global logger.
///
/// `RUST_LOG` still takes precedence over the given level, so a single module can be
/// turned up without touching the configuration.
///
pub fn init_logging(log_level: LevelFilter) {
    let env = Env::default().default_filter_or(log_level.to_string());
    if let Err(e) = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
    {
        eprintln!("Logger was already initialized: {}", e);
    }
}

/// Parses a textual level (`"debug"`, `"WARN"`, ...) falling back to `Info`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level(" error "), LevelFilter::Error);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }
}
