//! # Prometheus Metrics
//!
//! Exposes operational metrics for the registry node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of students registered through this node.
    pub students_registered_total: IntCounter,
    /// Total number of approver authorizations processed.
    pub approvers_authorized_total: IntCounter,
    /// Total number of recommendation requests applied.
    pub recommendations_requested_total: IntCounter,
    /// Total number of recommendations approved.
    pub recommendations_approved_total: IntCounter,
    /// Total number of operations rejected (validation, authorization,
    /// state, or not-found failures).
    pub operations_rejected_total: IntCounter,
    /// Current number of student records in the registry.
    pub students: IntGauge,
    /// Histogram of operation handling latency in seconds.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("endorse".into()), None)
            .expect("failed to create prometheus registry");

        let students_registered_total = IntCounter::new(
            "students_registered_total",
            "Total number of students registered",
        )
        .expect("metric creation");
        registry
            .register(Box::new(students_registered_total.clone()))
            .expect("metric registration");

        let approvers_authorized_total = IntCounter::new(
            "approvers_authorized_total",
            "Total number of approver authorizations processed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(approvers_authorized_total.clone()))
            .expect("metric registration");

        let recommendations_requested_total = IntCounter::new(
            "recommendations_requested_total",
            "Total number of recommendation requests applied",
        )
        .expect("metric creation");
        registry
            .register(Box::new(recommendations_requested_total.clone()))
            .expect("metric registration");

        let recommendations_approved_total = IntCounter::new(
            "recommendations_approved_total",
            "Total number of recommendations approved",
        )
        .expect("metric creation");
        registry
            .register(Box::new(recommendations_approved_total.clone()))
            .expect("metric registration");

        let operations_rejected_total = IntCounter::new(
            "operations_rejected_total",
            "Total number of operations rejected by validation, authorization, or state checks",
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_rejected_total.clone()))
            .expect("metric registration");

        let students = IntGauge::new("students", "Current number of student records")
            .expect("metric creation");
        registry
            .register(Box::new(students.clone()))
            .expect("metric registration");

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Registry operation handling latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            students_registered_total,
            approvers_authorized_total,
            recommendations_requested_total,
            recommendations_approved_total,
            operations_rejected_total,
            students,
            operation_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
