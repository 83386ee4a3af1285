//! # Wallet Telemetry
//!
//! Structured logging and Prometheus metrics for the wallet client bridge.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wallet_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WALLET_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `WALLET_JSON_LOGS` | `false` | Emit JSON log lines |
//! | `WALLET_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |
//! | `WALLET_SERVICE_NAME` | `taler-wallet` | Service name in log lines |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, BACKEND_RECONNECTS, BACKEND_REPLIES,
    BACKEND_REQUESTS_SENT, BACKEND_TIMEOUTS, NOTIFICATIONS_RECEIVED, PENDING_CALLS,
    QUEUED_FRAMES, REQUEST_DURATION, STALE_RESPONSES_DROPPED, UNKNOWN_REPLIES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize log subscriber: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    logging::init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
