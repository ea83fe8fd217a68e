//! # Prometheus Metrics — Exposition for Container Orchestration
//!
//! Exposes club platform metrics in the Prometheus text exposition format
//! for scraping by Prometheus, Grafana Agent, or any OpenMetrics-compatible collector.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `rota_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `rota_projects_created_total` | Counter | — | Projects posted by clients |
//! | `rota_projects_accepted_total` | Counter | — | Successful accepts |
//! | `rota_accept_races_lost_total` | Counter | — | Accepts that lost the conditional update |
//! | `rota_distribution_escalations_total` | Counter | — | Group escalations by the distribution job |
//! | `rota_distribution_expired_total` | Counter | — | Projects marked `no_interest` |
//! | `rota_points_awarded_total` | Counter | `action` | Points credited per action |
//! | `rota_points_limit_reached_total` | Counter | `action` | Awards refused by the daily cap |
//! | `rota_db_pool_connections` | Gauge | — | Open connections in the pool |
//!
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Label set for the HTTP latency histogram. `path` is normalized so ids do
/// not explode cardinality.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// Label set for per-action gamification counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ActionLabel {
    pub action: String,
}

/// Thread-safe metrics registry for the API server.
///
/// All fields use atomic types and are safe to update from any thread or async task.
/// The `Family` type automatically creates per-label-set metric instances on first use.
pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: Family<HttpLabel, Histogram>,
    pub projects_created: Counter,
    pub projects_accepted: Counter,
    pub accept_races_lost: Counter,
    pub distribution_escalations: Counter,
    pub distribution_expired: Counter,
    pub points_awarded: Family<ActionLabel, Counter>,
    pub points_limit_reached: Family<ActionLabel, Counter>,
    pub db_pool_connections: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration =
            Family::<HttpLabel, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.005, 2.0, 12))
            });
        registry.register(
            "rota_http_request_duration_seconds",
            "HTTP request latency by method and normalized path",
            http_request_duration.clone(),
        );

        let projects_created = Counter::default();
        registry.register(
            "rota_projects_created",
            "Projects posted by clients",
            projects_created.clone(),
        );

        let projects_accepted = Counter::default();
        registry.register(
            "rota_projects_accepted",
            "Projects accepted by a professional",
            projects_accepted.clone(),
        );

        let accept_races_lost = Counter::default();
        registry.register(
            "rota_accept_races_lost",
            "Accept attempts that lost the conditional update",
            accept_races_lost.clone(),
        );

        let distribution_escalations = Counter::default();
        registry.register(
            "rota_distribution_escalations",
            "Projects escalated to the next distribution group",
            distribution_escalations.clone(),
        );

        let distribution_expired = Counter::default();
        registry.register(
            "rota_distribution_expired",
            "Projects marked no_interest after the last group",
            distribution_expired.clone(),
        );

        let points_awarded = Family::<ActionLabel, Counter>::default();
        registry.register(
            "rota_points_awarded",
            "Gamification points credited by action",
            points_awarded.clone(),
        );

        let points_limit_reached = Family::<ActionLabel, Counter>::default();
        registry.register(
            "rota_points_limit_reached",
            "Point awards refused by the daily cap",
            points_limit_reached.clone(),
        );

        let db_pool_connections = Gauge::default();
        registry.register(
            "rota_db_pool_connections",
            "Open connections in the database pool",
            db_pool_connections.clone(),
        );

        Self {
            registry,
            http_request_duration,
            projects_created,
            projects_accepted,
            accept_races_lost,
            distribution_escalations,
            distribution_expired,
            points_awarded,
            points_limit_reached,
            db_pool_connections,
        }
    }

    /// Count one gamification award outcome.
    pub fn record_award(&self, action: &str, points: i64, limit_reached: bool) {
        let label = ActionLabel {
            action: action.to_string(),
        };
        if limit_reached {
            self.points_limit_reached.get_or_create(&label).inc();
        } else if points > 0 {
            self.points_awarded
                .get_or_create(&label)
                .inc_by(points.unsigned_abs());
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
