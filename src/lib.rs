pub mod collection; // Grid/list projections + dashboard summary
pub mod config;
pub mod core_state; // Shared state: the one document store
pub mod expiry;
pub mod models;
pub mod pipeline; // Camera + upload intake
pub mod review; // Intake review and commit
pub mod store;

pub use core_state::{CoreError, CoreState};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to
/// `config::default_log_filter()`. Calling it again is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
