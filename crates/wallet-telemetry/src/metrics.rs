//! Prometheus metrics for the wallet client bridge.
//!
//! All metrics follow the naming convention: `wallet_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // REQUEST ROUTER
    // =========================================================================

    /// Requests handed to the transport, by operation
    pub static ref BACKEND_REQUESTS_SENT: CounterVec = CounterVec::new(
        Opts::new("wallet_router_requests_sent_total", "Requests sent to the wallet backend"),
        &["operation"]
    ).expect("metric creation failed");

    /// Replies matched to a pending call
    pub static ref BACKEND_REPLIES: CounterVec = CounterVec::new(
        Opts::new("wallet_router_replies_total", "Replies matched to a pending call"),
        &["outcome"]  // outcome: ok/error
    ).expect("metric creation failed");

    /// Pending calls expired by the timeout sweeper
    pub static ref BACKEND_TIMEOUTS: Counter = Counter::new(
        "wallet_router_timeouts_total",
        "Pending calls completed with a timeout error"
    ).expect("metric creation failed");

    /// Replies for unknown or already completed correlation IDs
    pub static ref UNKNOWN_REPLIES: Counter = Counter::new(
        "wallet_router_unknown_replies_total",
        "Replies dropped because no call was pending under their ID"
    ).expect("metric creation failed");

    /// Calls currently waiting for a reply
    pub static ref PENDING_CALLS: Gauge = Gauge::new(
        "wallet_router_pending_calls",
        "Number of calls waiting for a reply"
    ).expect("metric creation failed");

    /// Round-trip time of completed calls
    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "wallet_router_request_duration_seconds",
            "Time from send to reply"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("bucket layout is static"))
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSPORT
    // =========================================================================

    /// Frames waiting in the outgoing queue
    pub static ref QUEUED_FRAMES: Gauge = Gauge::new(
        "wallet_transport_queued_frames",
        "Frames queued while the backend link is down"
    ).expect("metric creation failed");

    /// Successful (re)connections
    pub static ref BACKEND_RECONNECTS: Counter = Counter::new(
        "wallet_transport_connects_total",
        "Number of times the backend link was established"
    ).expect("metric creation failed");

    /// Notification frames received
    pub static ref NOTIFICATIONS_RECEIVED: Counter = Counter::new(
        "wallet_transport_notifications_total",
        "Notification frames received from the backend"
    ).expect("metric creation failed");

    // =========================================================================
    // DOMAIN STATE MACHINES
    // =========================================================================

    /// Responses discarded because their flow generation moved on
    pub static ref STALE_RESPONSES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("wallet_flow_stale_responses_total", "Responses ignored for a superseded flow"),
        &["flow"]  // flow: withdraw/payment
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Render all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_registry(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Router
        Box::new(BACKEND_REQUESTS_SENT.clone()),
        Box::new(BACKEND_REPLIES.clone()),
        Box::new(BACKEND_TIMEOUTS.clone()),
        Box::new(UNKNOWN_REPLIES.clone()),
        Box::new(PENDING_CALLS.clone()),
        Box::new(REQUEST_DURATION.clone()),
        // Transport
        Box::new(QUEUED_FRAMES.clone()),
        Box::new(BACKEND_RECONNECTS.clone()),
        Box::new(NOTIFICATIONS_RECEIVED.clone()),
        // Flows
        Box::new(STALE_RESPONSES_DROPPED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
