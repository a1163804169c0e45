//! # Telemetry
//!
//! Structured logging setup for binaries embedding the engine.
//!
//! Filtering follows `RUST_LOG` (e.g. `stockpilot_sync=debug,info`);
//! the fallback keeps the engine's own crates at INFO.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Call once at process start; returns an error if a subscriber is
/// already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,stockpilot_sync=info,stockpilot_db=info")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()?;
    Ok(())
}
