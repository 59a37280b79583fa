use crate::config::LoggingSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LoggingSettings) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match settings.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        "pretty" => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().with_target(true)).init(),
    }
}
