use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global JSON tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. `log` records (actix's request
/// logger, `LoggerMiddleware`) are forwarded into the same subscriber.
/// Returns `false` if a subscriber was already installed.
pub fn init_telemetry(default_filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
        .is_ok()
}
