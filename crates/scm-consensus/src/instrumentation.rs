//! Prometheus counters/gauges for commit latency, view-change count, and
//! repair volume — the ambient observability layer §6's Non-goals don't
//! exclude (Non-goals name only the feature surfaces: namespace layer, S3
//! gateway, UI). Gated behind the `otel` feature so a build without
//! Prometheus wiring still compiles `scm-consensus` cleanly.

#[cfg(feature = "otel")]
mod enabled {
    use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

    pub struct ConsensusMetrics {
        pub commits_total: IntCounter,
        pub view_changes_total: IntCounter,
        pub repair_requests_total: IntCounter,
        pub commit_latency_seconds: Histogram,
        pub current_view: IntGauge,
    }

    impl ConsensusMetrics {
        pub fn register(registry: &Registry) -> prometheus::Result<Self> {
            let commits_total = IntCounter::new("scm_consensus_commits_total", "Entries committed by this replica")?;
            let view_changes_total =
                IntCounter::new("scm_consensus_view_changes_total", "View changes this replica has participated in")?;
            let repair_requests_total =
                IntCounter::new("scm_consensus_repair_requests_total", "Repair requests issued by this replica")?;
            let commit_latency_seconds = Histogram::with_opts(HistogramOpts::new(
                "scm_consensus_commit_latency_seconds",
                "Time from submit to commit, as observed on the leader",
            ))?;
            let current_view = IntGauge::new("scm_consensus_current_view", "This replica's current view number")?;

            registry.register(Box::new(commits_total.clone()))?;
            registry.register(Box::new(view_changes_total.clone()))?;
            registry.register(Box::new(repair_requests_total.clone()))?;
            registry.register(Box::new(commit_latency_seconds.clone()))?;
            registry.register(Box::new(current_view.clone()))?;

            Ok(Self { commits_total, view_changes_total, repair_requests_total, commit_latency_seconds, current_view })
        }
    }
}

#[cfg(feature = "otel")]
pub use enabled::ConsensusMetrics;
