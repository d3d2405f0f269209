pub mod app;
pub mod config;
pub mod handlers;
pub mod membership;
pub mod metrics;

pub use app::{build_router, AppState};
