use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::NotificationResponse;
use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, email: String },

    /// A message was appended to a conversation
    MessageCreate { message: Message },

    /// A participant read the other side's messages
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        count: usize,
    },

    /// A conversation the user takes part in was created or touched
    ConversationUpdate {
        conversation_id: Uuid,
        last_message_at: DateTime<Utc>,
    },

    /// A notification was created for the user
    NotificationCreate { notification: NotificationResponse },

    /// One of the user's notifications was marked read
    NotificationRead { notification_id: Uuid },

    /// All of the user's notifications were marked read
    NotificationsAllRead,

    /// One of the user's notifications was deleted
    NotificationDelete { notification_id: Uuid },

    /// Subscription set was accepted; lists the conversations now watched
    Subscribed { conversation_ids: Vec<Uuid> },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a conversation.
    /// Events that return `None` are addressed to users, not conversations.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.conversation_id),
            Self::MessagesRead {
                conversation_id, ..
            } => Some(*conversation_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Watch these conversations for message and read-state events.
    /// Replaces the previous set.
    Subscribe { conversation_ids: Vec<Uuid> },
}
