use std::collections::HashSet;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

use bazaar_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// A live view onto the change feed for one user.
///
/// Holding it is what keeps the user registered with the dispatcher;
/// dropping it releases the registration on every exit path. Events
/// published while no subscription is open are not kept anywhere.
pub struct FeedSubscription {
    dispatcher: Dispatcher,
    user_id: Uuid,
    conn_id: Uuid,
    user_rx: mpsc::UnboundedReceiver<GatewayEvent>,
    broadcast_rx: broadcast::Receiver<GatewayEvent>,
    watched: HashSet<Uuid>,
}

impl FeedSubscription {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        user_id: Uuid,
        conn_id: Uuid,
        user_rx: mpsc::UnboundedReceiver<GatewayEvent>,
        broadcast_rx: broadcast::Receiver<GatewayEvent>,
    ) -> Self {
        Self {
            dispatcher,
            user_id,
            conn_id,
            user_rx,
            broadcast_rx,
            watched: HashSet::new(),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Replace the set of watched conversations.
    pub fn watch(&mut self, conversation_ids: impl IntoIterator<Item = Uuid>) {
        self.watched = conversation_ids.into_iter().collect();
    }

    pub fn watched(&self) -> &HashSet<Uuid> {
        &self.watched
    }

    /// Next event for this subscriber, or `None` once the feed is closed.
    /// Cancel-safe: an event is only consumed when it is returned.
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        loop {
            tokio::select! {
                event = self.user_rx.recv() => return event,
                result = self.broadcast_rx.recv() => match result {
                    Ok(event) => {
                        let in_scope = event
                            .conversation_id()
                            .is_some_and(|id| self.watched.contains(&id));
                        if in_scope {
                            return Some(event);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Feed for {} lagged, {} events skipped", self.user_id, n);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.dispatcher.release(self.user_id, self.conn_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::time::timeout;

    use super::*;
    use bazaar_types::models::Message;

    fn message_in(conversation_id: Uuid) -> GatewayEvent {
        GatewayEvent::MessageCreate {
            message: Message {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id: Uuid::new_v4(),
                body: "hello".into(),
                is_read: false,
                created_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn only_watched_conversations_are_delivered() {
        let dispatcher = Dispatcher::new();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sub = dispatcher.open(Uuid::new_v4());
        sub.watch([watched]);

        dispatcher.publish(message_in(other));
        dispatcher.publish(message_in(watched));

        let event = timeout(Duration::from_secs(1), sub.next()).await.unwrap().unwrap();
        assert_eq!(event.conversation_id(), Some(watched));
    }

    #[tokio::test]
    async fn user_events_reach_every_open_subscription() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let mut first = dispatcher.open(user);
        let mut second = dispatcher.open(user);
        let mut stranger = dispatcher.open(Uuid::new_v4());

        dispatcher.send_to_user(user, GatewayEvent::NotificationsAllRead);

        for sub in [&mut first, &mut second] {
            let event = timeout(Duration::from_secs(1), sub.next()).await.unwrap();
            assert_eq!(event, Some(GatewayEvent::NotificationsAllRead));
        }
        assert!(timeout(Duration::from_millis(50), stranger.next()).await.is_err());
    }

    #[tokio::test]
    async fn dropping_the_subscription_releases_it() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let sub = dispatcher.open(user);
        let other = dispatcher.open(user);
        assert_eq!(dispatcher.connection_count(user), 2);

        drop(sub);
        assert_eq!(dispatcher.connection_count(user), 1);
        drop(other);
        assert_eq!(dispatcher.connection_count(user), 0);
    }

    #[tokio::test]
    async fn release_happens_when_the_owning_task_fails() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let d = dispatcher.clone();

        let handle = tokio::spawn(async move {
            let _sub = d.open(user);
            Err::<(), &str>("connection error")
        });
        assert!(handle.await.unwrap().is_err());
        assert_eq!(dispatcher.connection_count(user), 0);
    }

    #[tokio::test]
    async fn events_are_not_buffered_for_absent_listeners() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let conv = Uuid::new_v4();

        dispatcher.send_to_user(user, GatewayEvent::NotificationsAllRead);
        dispatcher.publish(message_in(conv));

        let mut sub = dispatcher.open(user);
        sub.watch([conv]);
        assert!(timeout(Duration::from_millis(50), sub.next()).await.is_err());
    }
}
