use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct HostMetrics {
    registry: Registry,
    token_validations: IntCounterVec,
    activities: IntCounterVec,
}

impl HostMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let token_validations = IntCounterVec::new(
            Opts::new(
                "bot_token_validations_total",
                "Bearer token checks on the messaging endpoint grouped by outcome",
            ),
            &["outcome"],
        )?;
        let activities = IntCounterVec::new(
            Opts::new(
                "bot_activities_received_total",
                "Activities accepted by the messaging endpoint",
            ),
            &["activity_type"],
        )?;
        registry.register(Box::new(token_validations.clone()))?;
        registry.register(Box::new(activities.clone()))?;
        Ok(Self {
            registry,
            token_validations,
            activities,
        })
    }

    pub fn record_validation(&self, outcome: &str) {
        self.token_validations.with_label_values(&[outcome]).inc();
    }

    pub fn record_activity(&self, activity_type: &str) {
        self.activities.with_label_values(&[activity_type]).inc();
    }

    pub fn validation_count(&self, outcome: &str) -> u64 {
        self.token_validations.with_label_values(&[outcome]).get()
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
