use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::feed::FeedClient;
use crate::http::ApiClient;
use crate::live::{LiveInbox, Refresh, Scope};

/// A signed-in user's live view: REST for snapshots, the change feed for
/// everything after.
pub struct Session {
    api: ApiClient,
    feed: FeedClient,
    inbox: LiveInbox,
}

impl Session {
    /// Open the change feed for a signed-in client and load the initial
    /// conversation list and notifications.
    pub async fn start(api: ApiClient) -> Result<Self> {
        let token = api.token().ok_or(ClientError::NotSignedIn)?.to_string();
        let feed = FeedClient::connect(&api.gateway_url(), &token).await?;
        let mut session = Self {
            inbox: LiveInbox::new(feed.user_id()),
            api,
            feed,
        };

        session.reload(Scope::Conversations).await?;
        session.reload(Scope::Notifications).await?;
        info!(
            "Session started for {} with {} conversations",
            session.inbox.user_id(),
            session.inbox.conversations().len()
        );
        Ok(session)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn inbox(&self) -> &LiveInbox {
        &self.inbox
    }

    /// Load a conversation's history and merge its live messages from now on.
    pub async fn open_conversation(&mut self, conversation_id: Uuid) -> Result<()> {
        let res = self.api.get_conversation(conversation_id).await?;
        self.inbox.open_conversation(res.conversation.id, res.messages);
        Ok(())
    }

    pub fn close_conversation(&mut self) {
        self.inbox.close_conversation();
    }

    /// Wait for the next feed event and fold it in. Returns `None` once the
    /// server closes the feed.
    pub async fn next(&mut self) -> Result<Option<Refresh>> {
        let Some(event) = self.feed.next_event().await else {
            return Ok(None);
        };
        let refresh = self.inbox.apply(&event?);
        if let Refresh::Reload(scope) = refresh {
            self.reload(scope).await?;
        }
        Ok(Some(refresh))
    }

    pub async fn close(self) -> Result<()> {
        self.feed.close().await
    }

    async fn reload(&mut self, scope: Scope) -> Result<()> {
        debug!("Reloading {:?}", scope);
        match scope {
            Scope::Conversations => {
                let conversations = self.api.list_conversations().await?;
                self.inbox.set_conversations(conversations);
                // New conversations need to be watched as well.
                self.feed.subscribe(self.inbox.conversation_ids()).await?;
            }
            Scope::Notifications => {
                let notifications = self.api.list_notifications().await?;
                self.inbox.set_notifications(notifications);
            }
        }
        Ok(())
    }
}
