//! Session issuance: every other endpoint requires a bearer token from
//! somewhere, so this is the one unauthenticated route that mints one.

use axum::extract::State;
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::audit;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let user = state.auth.authenticate(&request.username, &request.password).await?;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let session = state.auth.create_session(user.id, &token, state.config.auth_session_ttl).await?;
    audit(&state, &user.username, "auth.login", "user", &user.id.to_string(), serde_json::json!({})).await;
    Ok(Json(LoginResponse { token, expires_at: session.expires_at }))
}
