//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the registry. Every collector is
//! registered on the instance's own [`Registry`], so several registries can
//! live in one process (tests, embedded use).
//!
//! # Metrics
//!
//! - `rights_certificates_minted_total` - Certificates minted
//! - `rights_licenses_sold_total` - Licenses granted
//! - `rights_licenses_expired_total` - Licenses removed by upkeep
//! - `rights_upkeep_runs_total` - Successful sweeps
//! - `rights_proceeds_credited` - Sale proceeds credited to escrow
//! - `rights_proceeds_withdrawn` - Proceeds paid out
//! - `rights_withdrawals_failed_total` - Payouts that failed and were restored
//! - `rights_commands_rejected_total` - Calls rejected by a precondition
//! - `rights_command_duration_seconds` - Histogram of command latencies
//! - `rights_escrow_outstanding` - Sum of withdrawable balances
//!
//! Amount metrics are `f64` samples of `u128` amounts and are approximate
//! above 2^53 units; the registry's own balances stay exact.

use prometheus::{
    Counter, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Certificates minted
    pub certificates_minted: IntCounter,

    /// Licenses granted
    pub licenses_sold: IntCounter,

    /// Licenses removed by upkeep
    pub licenses_expired: IntCounter,

    /// Successful sweeps
    pub upkeep_runs: IntCounter,

    /// Proceeds credited to escrow
    pub proceeds_credited: Counter,

    /// Proceeds paid out
    pub proceeds_withdrawn: Counter,

    /// Failed payouts
    pub withdrawals_failed: IntCounter,

    /// Rejected calls
    pub commands_rejected: IntCounter,

    /// Command duration histogram
    pub command_duration: Histogram,

    /// Outstanding escrow
    pub escrow_outstanding: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("certificates_minted", &self.certificates_minted.get())
            .field("licenses_sold", &self.licenses_sold.get())
            .field("licenses_expired", &self.licenses_expired.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let certificates_minted =
            IntCounter::new("rights_certificates_minted_total", "Certificates minted")?;
        registry.register(Box::new(certificates_minted.clone()))?;

        let licenses_sold = IntCounter::new("rights_licenses_sold_total", "Licenses granted")?;
        registry.register(Box::new(licenses_sold.clone()))?;

        let licenses_expired = IntCounter::new(
            "rights_licenses_expired_total",
            "Licenses removed by upkeep",
        )?;
        registry.register(Box::new(licenses_expired.clone()))?;

        let upkeep_runs = IntCounter::new("rights_upkeep_runs_total", "Successful sweeps")?;
        registry.register(Box::new(upkeep_runs.clone()))?;

        let proceeds_credited = Counter::new(
            "rights_proceeds_credited",
            "Sale proceeds credited to escrow (approximate above 2^53 units)",
        )?;
        registry.register(Box::new(proceeds_credited.clone()))?;

        let proceeds_withdrawn =
            Counter::new(
                "rights_proceeds_withdrawn",
                "Proceeds paid out (approximate above 2^53 units)",
            )?;
        registry.register(Box::new(proceeds_withdrawn.clone()))?;

        let withdrawals_failed = IntCounter::new(
            "rights_withdrawals_failed_total",
            "Payouts that failed and were restored",
        )?;
        registry.register(Box::new(withdrawals_failed.clone()))?;

        let commands_rejected = IntCounter::new(
            "rights_commands_rejected_total",
            "Calls rejected by a precondition",
        )?;
        registry.register(Box::new(commands_rejected.clone()))?;

        let command_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rights_command_duration_seconds",
                "Histogram of command latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let escrow_outstanding =
            Gauge::new(
                "rights_escrow_outstanding",
                "Sum of withdrawable balances (approximate above 2^53 units)",
            )?;
        registry.register(Box::new(escrow_outstanding.clone()))?;

        Ok(Self {
            certificates_minted,
            licenses_sold,
            licenses_expired,
            upkeep_runs,
            proceeds_credited,
            proceeds_withdrawn,
            withdrawals_failed,
            commands_rejected,
            command_duration,
            escrow_outstanding,
            registry,
        })
    }

    /// Record mint
    pub fn record_mint(&self) {
        self.certificates_minted.inc();
    }

    /// Record license sale
    pub fn record_license_sold(&self, paid: u128) {
        self.licenses_sold.inc();
        self.proceeds_credited.inc_by(paid as f64);
    }

    /// Record sweep
    pub fn record_upkeep(&self, removed: usize) {
        self.upkeep_runs.inc();
        self.licenses_expired.inc_by(removed as u64);
    }

    /// Record successful withdrawal
    pub fn record_withdrawal(&self, amount: u128) {
        self.proceeds_withdrawn.inc_by(amount as f64);
    }

    /// Record failed payout
    pub fn record_withdrawal_failed(&self) {
        self.withdrawals_failed.inc();
    }

    /// Record rejected call
    pub fn record_rejected(&self) {
        self.commands_rejected.inc();
    }

    /// Record command duration
    pub fn record_command_duration(&self, duration_seconds: f64) {
        self.command_duration.observe(duration_seconds);
    }

    /// Update outstanding escrow
    pub fn update_escrow_outstanding(&self, total: u128) {
        self.escrow_outstanding.set(total as f64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text exposition format
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
