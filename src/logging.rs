//! Tracing subscriber setup for the `askdb` binary.
//!
//! Honors `RUST_LOG` when set; falls back to `info`. Initialization is
//! guarded so tests and embedded callers can invoke it more than once.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static INIT: Once = Once::new();

pub fn init(level: Option<&str>) {
    INIT.call_once(|| {
        let fallback = level.unwrap_or("info").to_string();
        let filter = EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = fmt::layer().with_target(false).with_ansi(true);

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
