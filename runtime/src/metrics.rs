//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the ticket engine:
//! - Admission decisions
//! - Lifecycle transitions (create, assign, close)
//! - Transcript capture
//! - Auto-expiry sweeps
//! - Deferred channel deletions
//!
//! # Example
//!
//! ```rust,no_run
//! use ticketdesk_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves the Prometheus text format on
/// `addr` from a task on the current tokio runtime.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint is served on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and start
    /// serving. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built (e.g. `addr` cannot be
    /// bound).
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle or a listener.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        let addr = self.addr;
        tokio::spawn(async move {
            // `ExporterError` implements neither Debug nor Display in 0.15.
            if exporter.await.is_err() {
                tracing::error!(%addr, "Metrics endpoint stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(%addr, "Metrics served");
        Ok(())
    }

    /// Address of the scrape endpoint.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder wasn't installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("tickets_created_total", "Tickets created");
    describe_counter!(
        "tickets_admission_denied_total",
        "Ticket requests denied by admission control, by reason"
    );
    describe_counter!(
        "tickets_channel_creation_failures_total",
        "Ticket requests aborted because the channel could not be created"
    );
    describe_counter!("tickets_assigned_total", "Tickets accepted by a moderator");
    describe_counter!(
        "tickets_assign_conflicts_total",
        "Acceptances rejected because another moderator won"
    );
    describe_counter!("tickets_closed_total", "Tickets closed, by closer kind");
    describe_counter!(
        "tickets_close_conflicts_total",
        "Close requests on already closed tickets"
    );
    describe_counter!(
        "tickets_transcript_failures_total",
        "Closures whose transcript could not be captured"
    );
    describe_counter!(
        "tickets_notification_failures_total",
        "Notifications that could not be delivered"
    );
    describe_counter!(
        "tickets_channel_deletions_total",
        "Deferred channel deletions, by result"
    );
    describe_counter!(
        "ticket_sweep_failures_total",
        "Tickets the auto-expiry sweep failed to close"
    );
    describe_histogram!(
        "ticket_sweep_duration_seconds",
        "Time taken by one auto-expiry sweep"
    );
    describe_gauge!(
        "ticket_sweep_last_closed",
        "Tickets closed by the most recent sweep"
    );
}

/// Admission and lifecycle metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a created ticket.
    pub fn record_created(ticket_type: &str) {
        counter!("tickets_created_total", "type" => ticket_type.to_string()).increment(1);
    }

    /// Record an admission denial.
    pub fn record_denied(reason: &'static str) {
        counter!("tickets_admission_denied_total", "reason" => reason).increment(1);
    }

    /// Record a channel creation failure.
    pub fn record_channel_creation_failure() {
        counter!("tickets_channel_creation_failures_total").increment(1);
    }

    /// Record a successful assignment.
    pub fn record_assigned() {
        counter!("tickets_assigned_total").increment(1);
    }

    /// Record a lost assignment race or repeated acceptance.
    pub fn record_assign_conflict() {
        counter!("tickets_assign_conflicts_total").increment(1);
    }

    /// Record a closure.
    pub fn record_closed(closer: &'static str) {
        counter!("tickets_closed_total", "closer" => closer).increment(1);
    }

    /// Record a close on an already closed ticket.
    pub fn record_close_conflict() {
        counter!("tickets_close_conflicts_total").increment(1);
    }

    /// Record a failed transcript capture.
    pub fn record_transcript_failure() {
        counter!("tickets_transcript_failures_total").increment(1);
    }

    /// Record an undelivered notification.
    pub fn record_notification_failure() {
        counter!("tickets_notification_failures_total").increment(1);
    }

    /// Record the result of a deferred channel deletion.
    pub fn record_channel_deletion(ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        counter!("tickets_channel_deletions_total", "result" => result).increment(1);
    }
}

/// Auto-expiry sweep metrics recorder.
pub struct SweepMetrics;

impl SweepMetrics {
    /// Record a completed sweep.
    #[allow(clippy::cast_precision_loss)] // Gauge of small counts
    pub fn record_sweep(closed: usize, failed: usize, duration: Duration) {
        histogram!("ticket_sweep_duration_seconds").record(duration.as_secs_f64());
        gauge!("ticket_sweep_last_closed").set(closed as f64);
        counter!("ticket_sweep_failures_total").increment(failed as u64);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_metrics_server_serves_scrapes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        LifecycleMetrics::record_created("general");
        LifecycleMetrics::record_closed("moderator");
        SweepMetrics::record_sweep(2, 0, Duration::from_millis(40));

        let rendered = server.render().unwrap();
        assert!(rendered.contains("tickets_created_total"));
        assert!(rendered.contains("tickets_closed_total"));
        assert!(rendered.contains("ticket_sweep_duration_seconds"));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("tickets_created_total"));
    }
}
