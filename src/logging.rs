//! Logger setup for the binary

use env_logger::{Builder, Env};

/// Install the global logger. `RUST_LOG` wins over `default_level`; a second
/// call is a no-op.
pub fn init(default_level: &str) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();

    if builder.try_init().is_err() {
        log::debug!("logger already initialised");
    }
}

/// Map `-v` repetitions onto a filter, starting from the configured level
pub fn level_for_verbosity(configured: &str, verbose: u8) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("warn");
        init("debug");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity("info", 0), "info");
        assert_eq!(level_for_verbosity("info", 1), "debug");
        assert_eq!(level_for_verbosity("info", 3), "trace");
    }
}
