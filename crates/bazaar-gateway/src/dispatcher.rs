use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use bazaar_types::events::GatewayEvent;

use crate::feed::FeedSubscription;

const BROADCAST_CAPACITY: usize = 1024;

type UserChannels = HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>;

/// Routes change events to live feed subscriptions.
///
/// Conversation-scoped events go out on one broadcast channel and each
/// subscription keeps only the conversations it watches. User-scoped events
/// go straight to every open subscription of that user.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (conn_id -> sender); one entry per open subscription
    user_channels: RwLock<UserChannels>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Open a feed subscription for `user_id`. It stays registered until
    /// the returned value is dropped.
    pub fn open(&self, user_id: Uuid) -> FeedSubscription {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);

        debug!("Feed opened for {} (conn {})", user_id, conn_id);
        FeedSubscription::new(
            self.clone(),
            user_id,
            conn_id,
            rx,
            self.inner.broadcast_tx.subscribe(),
        )
    }

    /// Publish a conversation-scoped event. Nobody listening is not an error.
    pub fn publish(&self, event: GatewayEvent) {
        if event.conversation_id().is_none() {
            warn!("Dropping unscoped event on conversation channel: {:?}", event);
            return;
        }
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Send a user-scoped event to every open subscription of `user_id`.
    pub fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self
            .inner
            .user_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(conns) = channels.get(&user_id) {
            for tx in conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Number of open subscriptions for a user.
    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .user_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    pub(crate) fn release(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self
            .inner
            .user_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
        debug!("Feed closed for {} (conn {})", user_id, conn_id);
    }
}
