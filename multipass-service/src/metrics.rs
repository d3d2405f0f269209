use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    tokens_issued: IntCounter,
    auth_attempts: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tokens_issued = IntCounter::with_opts(Opts::new(
            "multipass_tokens_issued_total",
            "Count of card access tokens issued",
        ))?;
        registry.register(Box::new(tokens_issued.clone()))?;

        let auth_attempts = IntCounterVec::new(
            Opts::new(
                "multipass_auth_attempts_total",
                "Count of authentication attempts grouped by method and outcome",
            ),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(auth_attempts.clone()))?;

        Ok(Self {
            registry,
            tokens_issued,
            auth_attempts,
        })
    }

    pub fn token_issued(&self) {
        self.tokens_issued.inc();
    }

    pub fn auth_attempt(&self, method: &str, outcome: &str) {
        self.auth_attempts.with_label_values(&[method, outcome]).inc();
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
