use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use bazaar_types::api::{AddRatingRequest, Claims, RatingResponse};
use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::notifications::fan_out;
use crate::state::AppState;

pub async fn add_rating(
    State(state): State<AppState>,
    Path(seller_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddRatingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer_id = claims.sub;
    let rating = state
        .blocking(move |db| {
            db.add_rating(reviewer_id, seller_id, req.listing_id, req.rating, req.review.as_deref())
        })
        .await?;

    fan_out(
        &state,
        [seller_id],
        NotificationKind::Rating {
            stars: rating.rating,
            review: rating.review.clone(),
        },
        Some(rating.id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn list_ratings(
    State(state): State<AppState>,
    Path(seller_id): Path<Uuid>,
) -> Result<Json<Vec<RatingResponse>>, ApiError> {
    let rows = state.blocking(move |db| db.list_ratings(seller_id)).await?;
    Ok(Json(rows))
}
