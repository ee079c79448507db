pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::PipelineConfig;
pub use crate::core::error::{PipelineError, PipelineResult};
pub use crate::core::pipeline::{Pipeline, ProvisionResult};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jarsmith=debug")),
        )
        .init();
}
