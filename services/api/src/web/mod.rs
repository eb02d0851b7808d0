pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod speech_engine;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::resolve_scope;
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Builds the session, record and speech-channel routes, all behind the
/// identity middleware.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session", get(rest::get_session_handler))
        .route("/session/draft", put(rest::update_draft_handler))
        .route(
            "/session/personal-script",
            put(rest::edit_personal_script_handler),
        )
        .route("/session/generate", post(rest::generate_handler))
        .route("/session/save", post(rest::save_handler))
        .route("/session/reset", post(rest::reset_handler))
        .route("/records", get(rest::list_records_handler))
        .route("/records/{id}", delete(rest::delete_record_handler))
        .route("/records/{id}/load", post(rest::load_record_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            resolve_scope,
        ))
        .with_state(app_state)
}
