use axum::{
    Extension,
    extract::State,
};
use uuid::Uuid;

use bazaar_types::api::{Claims, UpdateProfileRequest, UpgradePremiumRequest};
use bazaar_types::models::User;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;

/// The signed-in user's profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = state.blocking(move |db| db.require_user(claims.sub)).await?;
    Ok(Json(user))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = state.blocking(move |db| db.require_user(user_id)).await?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .blocking(move |db| db.update_profile(claims.sub, &req))
        .await?;
    Ok(Json(user))
}

pub async fn upgrade_premium(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpgradePremiumRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .blocking(move |db| db.upgrade_to_premium(claims.sub, req.months))
        .await?;
    Ok(Json(user))
}
