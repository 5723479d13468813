use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use bazaar_types::api::{Claims, MarkReadResponse, SendMessageRequest};
use bazaar_types::events::GatewayEvent;
use bazaar_types::models::{Conversation, Message, display_name};
use bazaar_types::notifications::NotificationKind;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::notifications::fan_out;
use crate::state::{AppState, AppStateInner};

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .blocking(move |db| db.get_conversation(conversation_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    let message = deliver(&state, &conversation, &claims, req.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .blocking(move |db| {
            db.conversation_for(conversation_id, claims.sub)?;
            db.list_messages(conversation_id)
        })
        .await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let reader_id = claims.sub;
    let updated = state
        .blocking(move |db| db.mark_read(conversation_id, reader_id))
        .await?;

    if updated > 0 {
        state.dispatcher.publish(GatewayEvent::MessagesRead {
            conversation_id,
            reader_id,
            count: updated,
        });
    }
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = state
        .blocking(move |db| db.unread_message_count(claims.sub))
        .await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

/// Append a message and run its side effects: the insert goes out on the
/// conversation's feed, both participants get a conversation update, and
/// the counterparty is notified. Only the append can fail the call.
pub(crate) async fn deliver(
    state: &AppStateInner,
    conversation: &Conversation,
    sender: &Claims,
    body: String,
) -> Result<Message, ApiError> {
    let conversation_id = conversation.id;
    let sender_id = sender.sub;
    let message = state
        .blocking(move |db| db.append_message(conversation_id, sender_id, &body))
        .await?;

    state.dispatcher.publish(GatewayEvent::MessageCreate {
        message: message.clone(),
    });
    for participant in [conversation.buyer_id, conversation.seller_id] {
        state.dispatcher.send_to_user(
            participant,
            GatewayEvent::ConversationUpdate {
                conversation_id,
                last_message_at: message.created_at,
            },
        );
    }

    if let Some(recipient_id) = conversation.counterparty(sender_id) {
        let listing_id = conversation.listing_id;
        let listing_title = match state.blocking(move |db| db.get_listing(listing_id)).await {
            Ok(Some(listing)) => listing.title,
            Ok(None) => "a removed listing".to_string(),
            Err(e) => {
                warn!("Listing lookup for message notification failed: {}", e);
                "a listing".to_string()
            }
        };
        fan_out(
            state,
            [recipient_id],
            NotificationKind::Message {
                sender_name: display_name(&sender.email).to_string(),
                listing_title,
            },
            Some(conversation_id),
        )
        .await;
    }

    Ok(message)
}
