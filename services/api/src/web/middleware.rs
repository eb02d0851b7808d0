//! services/api/src/web/middleware.rs
//!
//! Identity middleware for the session and record routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use speaking_coach_core::domain::{Scope, UserId};
use std::sync::Arc;
use tracing::warn;

use crate::web::{rest::ErrorBody, state::AppState};

/// Header the upstream identity provider sets once it has authenticated the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that resolves the record scope for the request.
///
/// A store that needs an identity gets `Scope::Owner` from the `x-user-id`
/// header; without it the request is answered with 401. Otherwise every request
/// runs in `Scope::Local`. The scope is inserted into request extensions.
pub async fn resolve_scope(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let scope = if state.store.requires_identity() {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match user_id {
            Some(user_id) => Scope::Owner(UserId::new(user_id)),
            None => {
                warn!(path = %req.uri().path(), "Request without an identity rejected.");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorBody::new("unauthorized", "Sign in to use the record store.")),
                )
                    .into_response();
            }
        }
    } else {
        Scope::Local
    };

    req.extensions_mut().insert(scope);
    next.run(req).await
}
