use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::get;
use axum::Router;
use common_auth::Authenticator;

use crate::config::ServiceConfig;
use crate::handlers;
use crate::metrics::ServiceMetrics;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<ServiceMetrics>,
}

impl FromRef<AppState> for Arc<Authenticator> {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

impl FromRef<AppState> for Arc<ServiceConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/v1/user", get(handlers::current_user))
        .route("/generate-token", get(handlers::generate_token))
        .route("/public/card", get(handlers::public_card))
        .route("/card", get(handlers::member_card))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
