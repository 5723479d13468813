use std::time::Duration;

use tracing::{info, warn};

use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::notifications::fan_out;
use crate::state::AppState;

/// Background task that ends expired featured placements.
///
/// Runs on an interval, clears `is_featured` on listings whose
/// `featured_until` has passed, and tells each owner.
pub async fn run_feature_sweep(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match sweep_expired_features(&state).await {
            Ok(count) => {
                if count > 0 {
                    info!("Feature sweep: expired {} listings", count);
                }
            }
            Err(e) => {
                warn!("Feature sweep error: {}", e);
            }
        }
    }
}

pub async fn sweep_expired_features(state: &AppState) -> Result<usize, ApiError> {
    let expired = state.blocking(|db| db.expire_featured()).await?;

    for listing in &expired {
        fan_out(
            state,
            [listing.user_id],
            NotificationKind::FeatureExpiry {
                listing_title: listing.title.clone(),
            },
            Some(listing.id),
        )
        .await;
    }

    Ok(expired.len())
}
