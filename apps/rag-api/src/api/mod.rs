//! API routes module

pub mod health;
pub mod rag;

use axum::Router;

use crate::state::AppState;

/// Create all API routes, mounted at the root
pub fn routes(state: &AppState) -> Router {
    Router::new()
        .merge(rag::router(state))
        .merge(health::router(state.clone()))
}
