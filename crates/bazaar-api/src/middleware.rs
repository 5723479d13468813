use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use bazaar_gateway::connection::verify_token;
use bazaar_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Bearer token from an Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract and validate JWT from Authorization header.
///
/// The caller's profile row is created on first sight and `last_active`
/// is stamped on every request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::NotAuthenticated)?;
    let claims: Claims = verify_token(token, &state.jwt_secret).ok_or(ApiError::NotAuthenticated)?;

    let user_id = claims.sub;
    let email = claims.email.clone();
    state
        .blocking(move |db| {
            db.ensure_user(user_id, &email)?;
            db.touch_last_active(user_id)
        })
        .await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
