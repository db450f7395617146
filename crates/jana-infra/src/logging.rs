//! `tracing-subscriber` initialization, owned here so `jana-cli` and any
//! other embedder call one function instead of wiring a subscriber by hand.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs a `fmt` subscriber filtered by `loglevel`, overridable via the
/// standard `RUST_LOG` environment variable. Safe to call more than once;
/// only the first call takes effect.
pub fn init(loglevel: tracing::Level) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(loglevel.to_string()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    });
}
