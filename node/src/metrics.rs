//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use timelock_protocol::config::REWARD_PRECISION;
use timelock_protocol::types::Amount;
use timelock_protocol::{Receipt, ReceiptStatus, VaultLedger};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Operations accepted by `vault_submit`.
    pub submissions_total: IntCounter,
    /// Submissions that settled as confirmed.
    pub confirmed_total: IntCounter,
    /// Submissions the ledger rejected, labelled by error kind.
    pub rejected_total: IntCounterVec,
    /// Submissions applied in memory whose journal flush failed.
    pub not_durable_total: IntCounter,
    /// Time from submission to settlement, in seconds.
    pub confirmation_latency_seconds: Histogram,
    /// Principal currently locked, in ETH.
    pub total_locked_eth: Gauge,
    /// Discretionary owner funds (reward reserve), in ETH.
    pub owner_balance_eth: Gauge,
    /// 1 once emergency mode has been activated.
    pub emergency_mode: IntGauge,
    /// Number of accounts with an active deposit.
    pub depositors: IntGauge,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("timelock".into()), None)
            .expect("failed to create prometheus registry");

        let submissions_total = IntCounter::new(
            "submissions_total",
            "Total number of operations accepted for processing",
        )
        .expect("metric creation");
        registry
            .register(Box::new(submissions_total.clone()))
            .expect("metric registration");

        let confirmed_total = IntCounter::new(
            "confirmed_total",
            "Total number of submissions confirmed by the ledger",
        )
        .expect("metric creation");
        registry
            .register(Box::new(confirmed_total.clone()))
            .expect("metric registration");

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "rejected_total",
                "Total number of submissions rejected by the ledger",
            ),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_total.clone()))
            .expect("metric registration");

        let not_durable_total = IntCounter::new(
            "not_durable_total",
            "Total number of submissions applied without a successful journal flush",
        )
        .expect("metric creation");
        registry
            .register(Box::new(not_durable_total.clone()))
            .expect("metric registration");

        let confirmation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from submission to settled receipt in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(confirmation_latency_seconds.clone()))
            .expect("metric registration");

        let total_locked_eth = Gauge::new("total_locked_eth", "Principal currently locked in ETH")
            .expect("metric creation");
        registry
            .register(Box::new(total_locked_eth.clone()))
            .expect("metric registration");

        let owner_balance_eth = Gauge::new(
            "owner_balance_eth",
            "Owner discretionary funds available for rewards in ETH",
        )
        .expect("metric creation");
        registry
            .register(Box::new(owner_balance_eth.clone()))
            .expect("metric registration");

        let emergency_mode = IntGauge::new("emergency_mode", "1 when emergency mode is active")
            .expect("metric creation");
        registry
            .register(Box::new(emergency_mode.clone()))
            .expect("metric registration");

        let depositors = IntGauge::new("depositors", "Accounts holding an active deposit")
            .expect("metric creation");
        registry
            .register(Box::new(depositors.clone()))
            .expect("metric registration");

        Self {
            registry,
            submissions_total,
            confirmed_total,
            rejected_total,
            not_durable_total,
            confirmation_latency_seconds,
            total_locked_eth,
            owner_balance_eth,
            emergency_mode,
            depositors,
        }
    }

    /// Records one settled receipt.
    pub fn observe(&self, receipt: &Receipt) {
        match receipt.status {
            ReceiptStatus::Confirmed => self.confirmed_total.inc(),
            ReceiptStatus::Failed => {
                let kind = receipt.error.as_ref().map_or("Unknown", |e| e.kind());
                self.rejected_total.with_label_values(&[kind]).inc();
            }
            ReceiptStatus::NotDurable => self.not_durable_total.inc(),
            ReceiptStatus::Pending => return,
        }
        if let Some(latency) = receipt.latency() {
            self.confirmation_latency_seconds
                .observe(latency.as_secs_f64());
        }
    }

    /// Refreshes the ledger gauges from current state.
    pub fn refresh(&self, ledger: &VaultLedger) {
        self.total_locked_eth.set(wei_to_eth(ledger.get_total_locked()));
        self.owner_balance_eth.set(wei_to_eth(ledger.owner_balance()));
        self.emergency_mode
            .set(i64::from(ledger.get_emergency_mode()));
        self.depositors.set(ledger.depositor_count() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Lossy conversion for gauges only; never used for ledger arithmetic.
fn wei_to_eth(wei: Amount) -> f64 {
    wei as f64 / REWARD_PRECISION as f64
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
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
