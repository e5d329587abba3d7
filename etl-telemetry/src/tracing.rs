use std::sync::Once;

use etl_config::Environment;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable that turns on log output in tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global subscriber for a binary.
///
/// Production emits one JSON object per event so log lines can be queried by field,
/// development emits human readable lines. The level is controlled by `RUST_LOG` and
/// defaults to `info`.
pub fn init_tracing(
    app_name: &str,
    environment: Environment,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = env_filter();

    match environment {
        Environment::Prod => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        Environment::Dev => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?,
    }

    tracing::info!(app_name, %environment, "tracing initialized");

    Ok(())
}

/// Installs a test subscriber once per process.
///
/// Output is only produced when `ENABLE_TRACING` is set, so test runs stay quiet by default.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TEST_TRACING_ENV_NAME).is_err() {
            return;
        }

        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
