use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
use std::sync::Arc;

/// Routing counters for offline threshold tuning and dashboards.
#[derive(Clone)]
pub struct RouterMetrics {
    registry: Arc<Registry>,
    resolutions_total: Counter,
    fallbacks_total: Counter,
    executions_total: Counter,
    errors_total: Counter,
    resolution_confidence: Histogram,
}

impl RouterMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let resolutions_total = Counter::with_opts(
            prometheus::Opts::new(
                "router_resolutions_total",
                "Messages resolved deterministically to a tool",
            ),
        )
        .unwrap();

        let fallbacks_total = Counter::with_opts(
            prometheus::Opts::new(
                "router_fallbacks_total",
                "Messages deferred to the reasoning collaborator",
            ),
        )
        .unwrap();

        let executions_total = Counter::with_opts(
            prometheus::Opts::new("router_executions_total", "Tool executions attempted"),
        )
        .unwrap();

        let errors_total = Counter::with_opts(
            prometheus::Opts::new("router_errors_total", "Tool executions that failed"),
        )
        .unwrap();

        let resolution_confidence = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "router_resolution_confidence",
                "Confidence of accepted resolutions",
            )
            .buckets(vec![0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 1.0]),
        )
        .unwrap();

        registry.register(Box::new(resolutions_total.clone())).unwrap();
        registry.register(Box::new(fallbacks_total.clone())).unwrap();
        registry.register(Box::new(executions_total.clone())).unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();
        registry
            .register(Box::new(resolution_confidence.clone()))
            .unwrap();

        Self {
            registry: Arc::new(registry),
            resolutions_total,
            fallbacks_total,
            executions_total,
            errors_total,
            resolution_confidence,
        }
    }

    pub fn record_resolution(&self, confidence: f64) {
        self.resolutions_total.inc();
        self.resolution_confidence.observe(confidence);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_total.inc();
    }

    pub fn record_execution(&self, success: bool) {
        self.executions_total.inc();
        if !success {
            self.errors_total.inc();
        }
    }

    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_all_series() {
        let metrics = RouterMetrics::new();
        metrics.record_resolution(0.86);
        metrics.record_fallback();
        metrics.record_execution(true);
        metrics.record_execution(false);

        let dump = metrics.export();
        assert!(dump.contains("router_resolutions_total"));
        assert!(dump.contains("router_fallbacks_total"));
        assert!(dump.contains("router_executions_total 2"));
        assert!(dump.contains("router_errors_total 1"));
    }
}
