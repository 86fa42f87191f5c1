use prometheus::{Histogram, IntCounter, Registry};
use std::sync::Arc;
use std::time::Instant;

pub struct Metrics {
    registry: Registry,

    // Request metrics
    pub total_requests: IntCounter,
    pub failed_requests: IntCounter,
    pub forbidden_requests: IntCounter,
    pub request_duration: Histogram,

    // Interceptor metrics
    pub interceptor_executions_total: IntCounter,
    pub interceptor_errors_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let total_requests =
            IntCounter::new("docgate_requests_total", "Total number of gateway requests")
                .expect("metric creation failed");
        let failed_requests = IntCounter::new(
            "docgate_requests_failed",
            "Total number of failed gateway requests",
        )
        .expect("metric creation failed");
        let forbidden_requests = IntCounter::new(
            "docgate_requests_forbidden",
            "Total number of requests denied by the permission model",
        )
        .expect("metric creation failed");
        let request_duration = Histogram::with_opts(prometheus::HistogramOpts::new(
            "docgate_request_duration_seconds",
            "Request duration in seconds",
        ))
        .expect("metric creation failed");

        let interceptor_executions_total = IntCounter::new(
            "docgate_interceptor_executions_total",
            "Total number of interceptor executions",
        )
        .expect("metric creation failed");
        let interceptor_errors_total = IntCounter::new(
            "docgate_interceptor_errors_total",
            "Total number of interceptor errors",
        )
        .expect("metric creation failed");

        registry.register(Box::new(total_requests.clone())).unwrap();
        registry
            .register(Box::new(failed_requests.clone()))
            .unwrap();
        registry
            .register(Box::new(forbidden_requests.clone()))
            .unwrap();
        registry
            .register(Box::new(request_duration.clone()))
            .unwrap();
        registry
            .register(Box::new(interceptor_executions_total.clone()))
            .unwrap();
        registry
            .register(Box::new(interceptor_errors_total.clone()))
            .unwrap();

        Self {
            registry,
            total_requests,
            failed_requests,
            forbidden_requests,
            request_duration,
            interceptor_executions_total,
            interceptor_errors_total,
        }
    }

    pub fn record_request(&self) {
        self.total_requests.inc();
    }

    pub fn record_failed_request(&self) {
        self.failed_requests.inc();
    }

    pub fn record_forbidden_request(&self) {
        self.forbidden_requests.inc();
    }

    pub fn record_request_duration(&self, duration: std::time::Duration) {
        self.request_duration.observe(duration.as_secs_f64());
    }

    pub fn record_interceptor_execution(&self) {
        self.interceptor_executions_total.inc();
    }

    pub fn record_interceptor_error(&self) {
        self.interceptor_errors_total.inc();
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

pub struct RequestTimer {
    start: Instant,
    metrics: Arc<Metrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        self.metrics.record_request_duration(duration);
    }

    pub fn fail(self) {
        let duration = self.start.elapsed();
        self.metrics.record_request_duration(duration);
        self.metrics.record_failed_request();
    }
}
