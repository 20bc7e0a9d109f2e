// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;
pub mod error;

pub use config::{
    AppConfig, ImageCountPolicy, LogProfile, PresentModePolicy, RenderCfg, ShaderStageRequirement,
    ValidationMode, WindowCfg,
};
pub use error::ConfigError;

/// Installs the global `tracing` subscriber. Output goes to stderr so that
/// capability dumps and the final fatal line share one stream.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
