use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber. Safe to call more than once.
///
/// Every resolution attempt is logged under the `resolver` target with the
/// winning tool, confidence, raw score, matched terms and final arguments,
/// which is the feed for offline tuning of the acceptance threshold.
pub fn setup_logging() {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(fmt_layer)
            .init();
    });
}

#[macro_export]
macro_rules! log_route {
    ($level:ident, $tool:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "router",
            tool = $tool,
            $($arg)*
        );
    };
}
