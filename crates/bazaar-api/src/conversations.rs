use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use bazaar_types::api::{Claims, ConversationResponse, ConversationSummary, StartConversationRequest};
use bazaar_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::messages::deliver;
use crate::state::AppState;

/// Open (or reopen) the conversation between the caller and a listing's
/// owner, optionally sending a first message.
///
/// Responds 201 when the conversation is new, 200 when it already existed.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let buyer_id = claims.sub;
    let listing_id = req.listing_id;
    let (conversation, created) = state
        .blocking(move |db| db.start_conversation(buyer_id, listing_id))
        .await?;

    if created {
        info!(
            "{} started conversation {} about listing {}",
            buyer_id, conversation.id, listing_id
        );
        for participant in [conversation.buyer_id, conversation.seller_id] {
            state.dispatcher.send_to_user(
                participant,
                GatewayEvent::ConversationUpdate {
                    conversation_id: conversation.id,
                    last_message_at: conversation.last_message_at,
                },
            );
        }
    }

    let mut messages = Vec::new();
    if let Some(body) = req.message.filter(|m| !m.trim().is_empty()) {
        messages.push(deliver(&state, &conversation, &claims, body).await?);
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ConversationResponse { conversation, messages })))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let rows = state
        .blocking(move |db| db.list_conversations(claims.sub))
        .await?;
    Ok(Json(rows))
}

/// A conversation with its full message log.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let response = state
        .blocking(move |db| {
            let conversation = db.conversation_for(conversation_id, claims.sub)?;
            let messages = db.list_messages(conversation_id)?;
            Ok(ConversationResponse { conversation, messages })
        })
        .await?;
    Ok(Json(response))
}
