//! Prometheus counters/gauges for the RPC and consensus surfaces this
//! daemon exposes, in the style of `scm-consensus::instrumentation`'s
//! `ConsensusMetrics` — one `register(registry)` constructor, metrics
//! cloned out rather than re-looked-up on every request.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct ServerMetrics {
    pub requests_total: IntCounterVec,
    pub requests_failed_total: IntCounterVec,
    pub heartbeats_total: IntCounter,
    pub safe_mode_active: IntGauge,
    pub connections_open: IntGauge,
}

impl ServerMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("scm_server_requests_total", "RPC requests handled, by kind"),
            &["kind"],
        )?;
        let requests_failed_total = IntCounterVec::new(
            Opts::new("scm_server_requests_failed_total", "RPC requests that returned an error, by kind"),
            &["kind"],
        )?;
        let heartbeats_total = IntCounter::new("scm_server_heartbeats_total", "Datanode heartbeats processed")?;
        let safe_mode_active = IntGauge::new("scm_server_safe_mode_active", "1 while the cluster is in safe mode")?;
        let connections_open = IntGauge::new("scm_server_connections_open", "RPC connections currently accepted")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_failed_total.clone()))?;
        registry.register(Box::new(heartbeats_total.clone()))?;
        registry.register(Box::new(safe_mode_active.clone()))?;
        registry.register(Box::new(connections_open.clone()))?;

        Ok(Self { requests_total, requests_failed_total, heartbeats_total, safe_mode_active, connections_open })
    }

    pub fn record_request(&self, kind: &str, succeeded: bool) {
        self.requests_total.with_label_values(&[kind]).inc();
        if !succeeded {
            self.requests_failed_total.with_label_values(&[kind]).inc();
        }
        if kind == "heartbeat" {
            self.heartbeats_total.inc();
        }
    }

    pub fn set_safe_mode(&self, in_safe_mode: bool) {
        self.safe_mode_active.set(i64::from(in_safe_mode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_on_the_same_registry_fails() {
        let registry = Registry::new();
        ServerMetrics::register(&registry).unwrap();
        assert!(ServerMetrics::register(&registry).is_err());
    }

    #[test]
    fn record_request_increments_failures_only_on_error() {
        let registry = Registry::new();
        let metrics = ServerMetrics::register(&registry).unwrap();
        metrics.record_request("get_node", true);
        metrics.record_request("get_node", false);
        assert_eq!(metrics.requests_total.with_label_values(&["get_node"]).get(), 2);
        assert_eq!(metrics.requests_failed_total.with_label_values(&["get_node"]).get(), 1);
    }
}
