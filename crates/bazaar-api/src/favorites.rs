use axum::{
    Extension,
    extract::State,
};
use uuid::Uuid;

use bazaar_types::api::{Claims, FavoriteResponse, ToggleFavoriteResponse};
use bazaar_types::models::display_name;
use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::notifications::fan_out;
use crate::state::AppState;

/// Flip the caller's favorite. Adding one tells the owner someone is
/// interested.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ToggleFavoriteResponse>, ApiError> {
    let user_id = claims.sub;
    let (favorited, listing) = state
        .blocking(move |db| {
            let favorited = db.toggle_favorite(user_id, listing_id)?;
            Ok((favorited, db.get_listing(listing_id)?))
        })
        .await?;

    if let Some(listing) = listing.filter(|l| favorited && l.user_id != user_id) {
        fan_out(
            &state,
            [listing.user_id],
            NotificationKind::ListingInterest {
                interested_name: display_name(&claims.email).to_string(),
                listing_title: listing.title,
            },
            Some(listing_id),
        )
        .await;
    }

    Ok(Json(ToggleFavoriteResponse { favorited }))
}

pub async fn favorite_status(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ToggleFavoriteResponse>, ApiError> {
    let favorited = state
        .blocking(move |db| db.is_favorited(claims.sub, listing_id))
        .await?;
    Ok(Json(ToggleFavoriteResponse { favorited }))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FavoriteResponse>>, ApiError> {
    let rows = state
        .blocking(move |db| db.list_favorites(claims.sub))
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(favorite, listing)| FavoriteResponse {
                id: favorite.id,
                created_at: favorite.created_at,
                listing,
            })
            .collect(),
    ))
}
