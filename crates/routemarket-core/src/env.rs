// Environment detection and tracing bootstrap.

use std::sync::OnceLock;

/// Cached environment mode.
static ENV_MODE: OnceLock<EnvMode> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Production,
    Development,
    Test,
}

/// Parse an environment mode string. Anything unrecognised is development.
pub fn parse_env_mode(value: &str) -> EnvMode {
    match value.to_lowercase().as_str() {
        "production" | "prod" => EnvMode::Production,
        "test" | "testing" => EnvMode::Test,
        _ => EnvMode::Development,
    }
}

/// Detect the current environment mode.
/// Checks `ROUTEMARKET_ENV` and then `RUST_ENV`.
pub fn detect_env_mode() -> EnvMode {
    *ENV_MODE.get_or_init(|| {
        let env_val = std::env::var("ROUTEMARKET_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        parse_env_mode(&env_val)
    })
}

pub fn is_production() -> bool {
    detect_env_mode() == EnvMode::Production
}

pub fn is_test() -> bool {
    detect_env_mode() == EnvMode::Test
}

/// Read an environment variable, treating empty values as unset.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Initialize the `tracing` subscriber.
/// In production, emits JSON lines. In development, uses the pretty format.
/// `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production() {
            EnvFilter::new("routemarket=info,routemarket_axum=info,tower_http=info")
        } else {
            EnvFilter::new("routemarket=debug,routemarket_axum=debug,tower_http=debug")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    // A second init (e.g. in tests) is not an error worth surfacing.
    let _ = if is_production() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
