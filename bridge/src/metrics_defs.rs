//! Metrics definitions for the bridge.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "bridge.requests",
    metric_type: MetricType::Counter,
    description: "Completed upsert and lookup calls. Tagged with endpoint, outcome.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "bridge.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete an upsert or lookup in seconds. Tagged with endpoint.",
};

pub const TELEMETRY_DELIVERY_FAILED: MetricDef = MetricDef {
    name: "telemetry.delivery_failed",
    metric_type: MetricType::Counter,
    description: "Outcome events the log sink did not accept",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS, REQUEST_DURATION, TELEMETRY_DELIVERY_FAILED];
