use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SNAPSHOTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_snapshots_total",
        "Total snapshots received on the primary path"
    ))
    .unwrap();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_readings_total",
        "Total secondary readings received"
    ))
    .unwrap();
    pub static ref FIELD_CHANGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_field_changes_total",
        "Total sensor field changes detected between consecutive snapshots"
    ))
    .unwrap();
    pub static ref SUBSCRIPTION_ERRORS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_subscription_errors_total",
        "Total subscriptions ended by an error"
    ))
    .unwrap();
    pub static ref STREAM_RECONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_stream_reconnects_total",
        "Total stream reconnect attempts"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_SENT_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_notifications_sent_total",
        "Total notifications posted"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_FAILED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_notifications_failed_total",
        "Total notifications that failed or were suppressed"
    ))
    .unwrap();
    pub static ref CONNECTED: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_connected",
        "1 while the primary document exists and the subscription is live"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(SNAPSHOTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FIELD_CHANGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STREAM_RECONNECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECTED.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
