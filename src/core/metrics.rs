// Start of file: /src/core/metrics.rs

/*
    * Prometheus metrics for the service.
    * Every manager owns its own registry, labelled with the application name,
    * so several services (or tests) in one process do not collide. HTTP
    * metrics are built in; applications add their own counters, gauges and
    * histograms by name.
*/

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Content type of the text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Built-in HTTP metrics recorded by the metrics middleware
pub struct HttpMetrics {
    /// Requests by method, matched path and status code
    pub requests_total: IntCounterVec,
    /// Request latency by method and matched path
    pub request_duration: HistogramVec,
    /// Requests currently being served
    pub requests_in_progress: IntGaugeVec,
}

enum CustomMetric {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

pub struct MetricsManager {
    registry: Registry,
    http: HttpMetrics,
    custom: RwLock<HashMap<String, CustomMetric>>,
}

impl MetricsManager {
    pub fn new(app_name: &str) -> Result<Self> {
        let registry: Registry = Registry::new_custom(
            None,
            Some(HashMap::from([("app".to_string(), app_name.to_string())])),
        )
        .context("Failed to create metrics registry")?;

        let requests_total: IntCounterVec = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let request_duration: HistogramVec = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency in seconds"),
            &["method", "path"],
        )?;
        let requests_in_progress: IntGaugeVec = IntGaugeVec::new(
            Opts::new("http_requests_in_progress", "HTTP requests currently in progress"),
            &["method", "path"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(requests_in_progress.clone()))?;

        Ok(Self {
            registry,
            http: HttpMetrics { requests_total, request_duration, requests_in_progress },
            custom: RwLock::new(HashMap::new()),
        })
    }

    pub fn http(&self) -> &HttpMetrics {
        &self.http
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn insert(&self, name: &str, metric: CustomMetric, collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
        let mut custom = self.custom.write();
        if custom.contains_key(name) {
            return Err(anyhow!("metric '{name}' already exists"));
        }
        self.registry
            .register(collector)
            .with_context(|| format!("Failed to register metric '{name}'"))?;
        custom.insert(name.to_string(), metric);
        Ok(())
    }

    pub fn create_counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let counter: CounterVec = CounterVec::new(Opts::new(name, help), labels)?;
        self.insert(name, CustomMetric::Counter(counter.clone()), Box::new(counter))
    }

    pub fn create_gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let gauge: GaugeVec = GaugeVec::new(Opts::new(name, help), labels)?;
        self.insert(name, CustomMetric::Gauge(gauge.clone()), Box::new(gauge))
    }

    /// `buckets` defaults to the prometheus default buckets.
    pub fn create_histogram(&self, name: &str, help: &str, labels: &[&str], buckets: Option<Vec<f64>>) -> Result<()> {
        let mut opts: HistogramOpts = HistogramOpts::new(name, help);
        if let Some(buckets) = buckets {
            opts = opts.buckets(buckets);
        }
        let histogram: HistogramVec = HistogramVec::new(opts, labels)?;
        self.insert(name, CustomMetric::Histogram(histogram.clone()), Box::new(histogram))
    }

    /// Counters only go up: negative or non-finite increments are rejected.
    pub fn inc_counter(&self, name: &str, labels: &[&str], value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            bail!("counter '{name}' cannot be incremented by {value}");
        }
        match self.custom.read().get(name) {
            Some(CustomMetric::Counter(counter)) => {
                counter.get_metric_with_label_values(labels)?.inc_by(value);
                Ok(())
            }
            _ => Err(anyhow!("counter '{name}' not found")),
        }
    }

    pub fn set_gauge(&self, name: &str, labels: &[&str], value: f64) -> Result<()> {
        match self.custom.read().get(name) {
            Some(CustomMetric::Gauge(gauge)) => {
                gauge.get_metric_with_label_values(labels)?.set(value);
                Ok(())
            }
            _ => Err(anyhow!("gauge '{name}' not found")),
        }
    }

    /// Adds `delta` (may be negative) to a gauge.
    pub fn add_gauge(&self, name: &str, labels: &[&str], delta: f64) -> Result<()> {
        match self.custom.read().get(name) {
            Some(CustomMetric::Gauge(gauge)) => {
                gauge.get_metric_with_label_values(labels)?.add(delta);
                Ok(())
            }
            _ => Err(anyhow!("gauge '{name}' not found")),
        }
    }

    pub fn observe_histogram(&self, name: &str, labels: &[&str], value: f64) -> Result<()> {
        match self.custom.read().get(name) {
            Some(CustomMetric::Histogram(histogram)) => {
                histogram.get_metric_with_label_values(labels)?.observe(value);
                Ok(())
            }
            _ => Err(anyhow!("histogram '{name}' not found")),
        }
    }

    /// Renders every metric in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer: Vec<u8> = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }
}


// End of file: /src/core/metrics.rs
