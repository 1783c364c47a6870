//! Bearer-token authentication: validates the session, loads the user,
//! and attaches both to the request so handlers can permission-check
//! with `gitaudit_core::Role::allows` before touching a component.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use gitaudit_core::{GitopsError, Role};
use gitaudit_store::User;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub role: Role,
}

pub async fn require_session(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| GitopsError::auth_failed("missing bearer token"))?;

    let session = state.auth.validate_session(token).await?.ok_or_else(|| GitopsError::auth_failed("session expired or unknown"))?;
    let user = state.store.get_user(session.user_id).await?.ok_or_else(|| GitopsError::auth_failed("session user no longer exists"))?;
    let role: Role = user.role.parse().map_err(|_| GitopsError::auth_failed("user has an unrecognized role"))?;

    request.extensions_mut().insert(AuthenticatedUser { user, role });
    Ok(next.run(request).await)
}
