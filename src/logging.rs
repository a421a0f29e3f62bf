//! Logger initialisation
//!
//! Everything in the crate logs through the `log` facade. Binaries call
//! [`init`] once at startup; `RUST_LOG` always wins over the default filter.

use env_logger::{Builder, Env};

/// Default filter used when `RUST_LOG` is not set
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Install the global logger. Calling it again is harmless.
pub fn init(debug: bool) {
    let _ = Builder::from_env(Env::default().default_filter_or(default_filter(debug)))
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "debug");
        assert_eq!(default_filter(false), "info");
    }

    #[test]
    fn test_init_twice() {
        init(false);
        init(true);
        log::info!("logger still usable");
    }
}
