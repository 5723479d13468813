use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use bazaar_types::api::{
    Claims, CreateListingRequest, FeatureListingRequest, ListingAnalytics, ListingQuery,
    ListingResponse, UpdateListingRequest,
};
use bazaar_types::models::Listing;
use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::notifications::fan_out;
use crate::state::AppState;

pub async fn search_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let rows = state.blocking(move |db| db.search_listings(&query)).await?;
    Ok(Json(rows))
}

/// Public listing page with the seller's profile attached.
pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ListingResponse>, ApiError> {
    let response = state
        .blocking(move |db| {
            let listing = db.require_listing(listing_id)?;
            let seller = db.get_user(listing.user_id)?;
            Ok(ListingResponse { listing, seller })
        })
        .await?;
    Ok(Json(response))
}

pub async fn create_listing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = claims.sub;
    let listing = state
        .blocking(move |db| db.create_listing(owner_id, &req))
        .await?;
    info!("Listing {} created by {}", listing.id, owner_id);

    let category = listing.category;
    let interested = state
        .blocking(move |db| db.interested_in_category(category, owner_id))
        .await
        .unwrap_or_else(|e| {
            warn!("Interest lookup for new listing {} failed: {}", listing.id, e);
            Vec::new()
        });
    fan_out(
        &state,
        interested,
        NotificationKind::NewListing {
            category: listing.category,
            listing_title: listing.title.clone(),
        },
        Some(listing.id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(listing)))
}

/// Owner-only partial update. Lowering the price alerts everyone who
/// favorited the listing.
pub async fn update_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    let owner_id = claims.sub;
    let (before, after) = state
        .blocking(move |db| db.update_listing(owner_id, listing_id, &req))
        .await?;

    if after.price < before.price && !after.is_sold {
        let favoriters = state
            .blocking(move |db| db.favoriters_of(listing_id))
            .await
            .unwrap_or_else(|e| {
                warn!("Favoriter lookup for listing {} failed: {}", listing_id, e);
                Vec::new()
            });
        fan_out(
            &state,
            favoriters.into_iter().filter(|u| *u != owner_id),
            NotificationKind::PriceDrop {
                listing_title: after.title.clone(),
                old_price: before.price,
                new_price: after.price,
            },
            Some(listing_id),
        )
        .await;
    }

    Ok(Json(after))
}

pub async fn delete_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state
        .blocking(move |db| db.delete_listing(claims.sub, listing_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_sold(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Listing>, ApiError> {
    let owner_id = claims.sub;
    let listing = state
        .blocking(move |db| db.mark_sold(owner_id, listing_id))
        .await?;
    info!("Listing {} marked sold", listing_id);

    fan_out(
        &state,
        [owner_id],
        NotificationKind::Sale {
            listing_title: listing.title.clone(),
        },
        Some(listing_id),
    )
    .await;

    Ok(Json(listing))
}

pub async fn feature_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FeatureListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    let listing = state
        .blocking(move |db| db.feature_listing(claims.sub, listing_id, req.days))
        .await?;
    Ok(Json(listing))
}

pub async fn record_view(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user_agent = header_value(&headers, header::USER_AGENT.as_str());
    let ip_address = header_value(&headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));

    state
        .blocking(move |db| {
            db.record_view(
                listing_id,
                Some(claims.sub),
                ip_address.as_deref(),
                user_agent.as_deref(),
            )
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analytics(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ListingAnalytics>, ApiError> {
    let report = state
        .blocking(move |db| db.listing_analytics(claims.sub, listing_id))
        .await?;
    Ok(Json(report))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
