use uuid::Uuid;

use bazaar_types::api::{ConversationSummary, NotificationResponse};
use bazaar_types::events::GatewayEvent;
use bazaar_types::models::Message;

/// Which local copy must be fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Conversations,
    Notifications,
}

/// What applying a feed event did to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The event was folded into local state directly.
    Merged,
    /// Local state for the scope is stale and must be reloaded.
    Reload(Scope),
    /// Nothing local depends on this event.
    Ignored,
}

struct OpenConversation {
    id: Uuid,
    messages: Vec<Message>,
}

/// Local copies of a user's conversation list, open conversation and
/// notifications, kept current from change feed events.
///
/// Message inserts for the open conversation are merged in place. Any
/// change to the conversation list only marks it stale, because previews
/// and unread counts are computed by the server.
pub struct LiveInbox {
    user_id: Uuid,
    conversations: Vec<ConversationSummary>,
    open: Option<OpenConversation>,
    notifications: Vec<NotificationResponse>,
}

impl LiveInbox {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            conversations: Vec::new(),
            open: None,
            notifications: Vec::new(),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn conversation_ids(&self) -> Vec<Uuid> {
        self.conversations.iter().map(|c| c.id).collect()
    }

    pub fn set_conversations(&mut self, conversations: Vec<ConversationSummary>) {
        self.conversations = conversations;
    }

    pub fn open_conversation_id(&self) -> Option<Uuid> {
        self.open.as_ref().map(|o| o.id)
    }

    /// Messages of the open conversation, oldest first.
    pub fn messages(&self) -> &[Message] {
        self.open.as_ref().map(|o| o.messages.as_slice()).unwrap_or_default()
    }

    pub fn open_conversation(&mut self, id: Uuid, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        self.open = Some(OpenConversation { id, messages });
    }

    pub fn close_conversation(&mut self) {
        self.open = None;
    }

    pub fn notifications(&self) -> &[NotificationResponse] {
        &self.notifications
    }

    pub fn set_notifications(&mut self, notifications: Vec<NotificationResponse>) {
        self.notifications = notifications;
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    /// Fold one feed event into local state.
    pub fn apply(&mut self, event: &GatewayEvent) -> Refresh {
        match event {
            GatewayEvent::MessageCreate { message } => self.merge_message(message),

            GatewayEvent::MessagesRead {
                conversation_id,
                reader_id,
                ..
            } => {
                let mut changed = false;
                if let Some(open) = self.open.as_mut().filter(|o| o.id == *conversation_id) {
                    for m in open.messages.iter_mut().filter(|m| m.sender_id != *reader_id) {
                        if !m.is_read {
                            m.is_read = true;
                            changed = true;
                        }
                    }
                }
                if *reader_id == self.user_id {
                    if let Some(summary) = self.conversations.iter_mut().find(|c| c.id == *conversation_id) {
                        if summary.unread_count != 0 {
                            summary.unread_count = 0;
                            changed = true;
                        }
                    }
                }
                if changed { Refresh::Merged } else { Refresh::Ignored }
            }

            GatewayEvent::ConversationUpdate { .. } => Refresh::Reload(Scope::Conversations),

            GatewayEvent::NotificationCreate { notification } => {
                if self.notifications.iter().any(|n| n.id == notification.id) {
                    return Refresh::Ignored;
                }
                self.notifications.insert(0, notification.clone());
                Refresh::Merged
            }

            GatewayEvent::NotificationRead { notification_id } => {
                match self.notifications.iter_mut().find(|n| n.id == *notification_id) {
                    Some(n) => {
                        n.is_read = true;
                        Refresh::Merged
                    }
                    None => Refresh::Reload(Scope::Notifications),
                }
            }

            GatewayEvent::NotificationsAllRead => {
                for n in &mut self.notifications {
                    n.is_read = true;
                }
                Refresh::Merged
            }

            GatewayEvent::NotificationDelete { notification_id } => {
                let before = self.notifications.len();
                self.notifications.retain(|n| n.id != *notification_id);
                if self.notifications.len() < before {
                    Refresh::Merged
                } else {
                    Refresh::Ignored
                }
            }

            GatewayEvent::Ready { .. } | GatewayEvent::Subscribed { .. } => Refresh::Ignored,
        }
    }

    fn merge_message(&mut self, message: &Message) -> Refresh {
        let Some(open) = self.open.as_mut().filter(|o| o.id == message.conversation_id) else {
            return Refresh::Ignored;
        };
        if open.messages.iter().any(|m| m.id == message.id) {
            return Refresh::Ignored;
        }
        // Stable position: after every message with the same or earlier time.
        let at = open
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        open.messages.insert(at, message.clone());
        Refresh::Merged
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use bazaar_types::models::Notification;
    use bazaar_types::notifications::NotificationKind;

    fn message(conversation_id: Uuid, sender_id: Uuid, body: &str, offset_ms: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.into(),
            is_read: false,
            created_at: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    fn notification(user_id: Uuid) -> NotificationResponse {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::Sale {
                listing_title: "Lamp".into(),
            },
            is_read: false,
            related_id: None,
            created_at: Utc::now(),
        }
        .into()
    }

    fn summary(id: Uuid, me: Uuid, unread_count: i64) -> ConversationSummary {
        ConversationSummary {
            id,
            buyer_id: me,
            seller_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            listing_title: "Lamp".into(),
            counterparty_id: Uuid::new_v4(),
            counterparty_email: "seller@campus.edu".into(),
            last_message_at: Utc::now(),
            created_at: Utc::now(),
            last_message: None,
            unread_count,
        }
    }

    #[test]
    fn open_conversation_messages_merge_in_order() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        inbox.open_conversation(conv, vec![message(conv, me, "first", 0)]);

        let reply = message(conv, them, "second", 10);
        let event = GatewayEvent::MessageCreate { message: reply.clone() };
        assert_eq!(inbox.apply(&event), Refresh::Merged);
        assert_eq!(inbox.apply(&event), Refresh::Ignored);

        let bodies: Vec<&str> = inbox.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[test]
    fn late_arrivals_land_in_time_order() {
        let me = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        inbox.open_conversation(conv, vec![message(conv, me, "a", 0), message(conv, me, "c", 20)]);

        inbox.apply(&GatewayEvent::MessageCreate {
            message: message(conv, me, "b", 10),
        });
        let bodies: Vec<&str> = inbox.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[test]
    fn other_conversations_are_ignored() {
        let me = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        inbox.open_conversation(Uuid::new_v4(), vec![]);

        let stray = message(Uuid::new_v4(), me, "elsewhere", 0);
        assert_eq!(inbox.apply(&GatewayEvent::MessageCreate { message: stray }), Refresh::Ignored);
        assert!(inbox.messages().is_empty());
    }

    #[test]
    fn conversation_changes_ask_for_a_reload() {
        let mut inbox = LiveInbox::new(Uuid::new_v4());
        let event = GatewayEvent::ConversationUpdate {
            conversation_id: Uuid::new_v4(),
            last_message_at: Utc::now(),
        };
        assert_eq!(inbox.apply(&event), Refresh::Reload(Scope::Conversations));
    }

    #[test]
    fn read_receipts_only_touch_the_other_sides_messages() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        inbox.open_conversation(conv, vec![message(conv, me, "mine", 0), message(conv, them, "theirs", 1)]);

        let event = GatewayEvent::MessagesRead {
            conversation_id: conv,
            reader_id: them,
            count: 1,
        };
        assert_eq!(inbox.apply(&event), Refresh::Merged);
        assert!(inbox.messages()[0].is_read);
        assert!(!inbox.messages()[1].is_read);
        assert_eq!(inbox.apply(&event), Refresh::Ignored);
    }

    #[test]
    fn own_read_clears_the_unread_badge() {
        let me = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        inbox.set_conversations(vec![summary(conv, me, 3)]);

        let event = GatewayEvent::MessagesRead {
            conversation_id: conv,
            reader_id: me,
            count: 3,
        };
        assert_eq!(inbox.apply(&event), Refresh::Merged);
        assert_eq!(inbox.conversations()[0].unread_count, 0);
    }

    #[test]
    fn notifications_prepend_patch_and_remove() {
        let me = Uuid::new_v4();
        let mut inbox = LiveInbox::new(me);
        let older = notification(me);
        let newer = notification(me);
        inbox.set_notifications(vec![older.clone()]);

        let create = GatewayEvent::NotificationCreate { notification: newer.clone() };
        assert_eq!(inbox.apply(&create), Refresh::Merged);
        assert_eq!(inbox.apply(&create), Refresh::Ignored);
        assert_eq!(inbox.notifications()[0].id, newer.id);
        assert_eq!(inbox.unread_notifications(), 2);

        assert_eq!(
            inbox.apply(&GatewayEvent::NotificationRead { notification_id: newer.id }),
            Refresh::Merged
        );
        assert_eq!(inbox.unread_notifications(), 1);

        assert_eq!(
            inbox.apply(&GatewayEvent::NotificationDelete { notification_id: older.id }),
            Refresh::Merged
        );
        assert_eq!(inbox.notifications().len(), 1);

        assert_eq!(inbox.apply(&GatewayEvent::NotificationsAllRead), Refresh::Merged);
        assert_eq!(inbox.unread_notifications(), 0);
    }

    #[test]
    fn unknown_notification_update_means_stale_copy() {
        let mut inbox = LiveInbox::new(Uuid::new_v4());
        let event = GatewayEvent::NotificationRead {
            notification_id: Uuid::new_v4(),
        };
        assert_eq!(inbox.apply(&event), Refresh::Reload(Scope::Notifications));
    }
}
