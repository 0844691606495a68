//! # Prometheus Metrics
//!
//! Service counters scraped at `/metrics` on the metrics port. Everything
//! lives in a dedicated [`prometheus::Registry`].

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Transactions recorded through prepare, including idempotent repeats.
    pub transactions_prepared_total: IntCounter,
    /// Authorizations accepted.
    pub authorizations_total: IntCounter,
    /// Submissions by outcome: `submitted`, `retriable`, `failed`, `refused`.
    pub submissions_total: IntCounterVec,
    /// Requests turned away by the transport signature check.
    pub signature_rejections_total: IntCounter,
    pub submit_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("settlement".into()), None)?;

        let transactions_prepared_total = IntCounter::new(
            "transactions_prepared_total",
            "Transactions returned by prepare",
        )?;
        registry.register(Box::new(transactions_prepared_total.clone()))?;

        let authorizations_total =
            IntCounter::new("authorizations_total", "Document authorizations accepted")?;
        registry.register(Box::new(authorizations_total.clone()))?;

        let submissions_total = IntCounterVec::new(
            Opts::new("submissions_total", "Submission attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let signature_rejections_total = IntCounter::new(
            "signature_rejections_total",
            "Requests rejected by HTTP signature verification",
        )?;
        registry.register(Box::new(signature_rejections_total.clone()))?;

        let submit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("submit_latency_seconds", "Submit handling latency in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(submit_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            transactions_prepared_total,
            authorizations_total,
            submissions_total,
            signature_rejections_total,
            submit_latency_seconds,
        })
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
