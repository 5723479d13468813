use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use bazaar_types::api::{Claims, NotificationResponse, UnreadCountResponse};
use bazaar_types::events::GatewayEvent;
use bazaar_types::models::Notification;
use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, AppStateInner};

const MAX_LIST_LIMIT: u32 = 200;

/// Create a notification and push it to the recipient's live feeds.
pub async fn notify(
    state: &AppStateInner,
    recipient_id: Uuid,
    kind: NotificationKind,
    related_id: Option<Uuid>,
) -> Result<Notification, ApiError> {
    let notification = state
        .blocking(move |db| db.create_notification(recipient_id, &kind, related_id))
        .await?;

    state.dispatcher.send_to_user(
        recipient_id,
        GatewayEvent::NotificationCreate {
            notification: notification.clone().into(),
        },
    );
    debug!("Notified {} ({})", recipient_id, notification.kind.tag());
    Ok(notification)
}

/// Best-effort notification of every recipient. Failures are logged and
/// dropped; the caller's action has already succeeded.
pub async fn fan_out(
    state: &AppStateInner,
    recipients: impl IntoIterator<Item = Uuid>,
    kind: NotificationKind,
    related_id: Option<Uuid>,
) -> usize {
    let mut delivered = 0;
    for recipient_id in recipients {
        match notify(state, recipient_id, kind.clone(), related_id).await {
            Ok(_) => delivered += 1,
            Err(e) => warn!(
                "Failed to create {} notification for {}: {}",
                kind.tag(),
                recipient_id,
                e
            ),
        }
    }
    delivered
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let limit = query.limit.min(MAX_LIST_LIMIT);
    let rows = state
        .blocking(move |db| db.list_notifications(claims.sub, query.unread_only, limit))
        .await?;
    Ok(Json(rows.into_iter().map(NotificationResponse::from).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = state
        .blocking(move |db| db.unread_notification_count(claims.sub))
        .await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let changed = state
        .blocking(move |db| db.mark_notification_read(claims.sub, notification_id))
        .await?;
    if changed {
        state
            .dispatcher
            .send_to_user(claims.sub, GatewayEvent::NotificationRead { notification_id });
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .blocking(move |db| db.mark_all_notifications_read(claims.sub))
        .await?;
    if updated > 0 {
        state
            .dispatcher
            .send_to_user(claims.sub, GatewayEvent::NotificationsAllRead);
    }
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .blocking(move |db| db.delete_notification(claims.sub, notification_id))
        .await?;
    state
        .dispatcher
        .send_to_user(claims.sub, GatewayEvent::NotificationDelete { notification_id });
    Ok(StatusCode::NO_CONTENT)
}
