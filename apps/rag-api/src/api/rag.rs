//! Wires the RAG domain to HTTP routes.

use axum::Router;
use domain_rag::{RagService, handlers};

use crate::state::AppState;

pub fn router(state: &AppState) -> Router {
    let service = RagService::from_config(state.db.clone(), state.config.rag.clone());
    handlers::router(service)
}
