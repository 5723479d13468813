//! Change feed over a real socket: server router on an ephemeral port,
//! client side through `bazaar-client`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use bazaar_api::auth::create_token;
use bazaar_api::storage::Storage;
use bazaar_api::{AppState, AppStateInner, router};
use bazaar_client::{ApiClient, FeedClient, Refresh, Scope, Session};
use bazaar_db::Database;
use bazaar_gateway::dispatcher::Dispatcher;
use bazaar_types::api::CreateListingRequest;
use bazaar_types::events::GatewayEvent;
use bazaar_types::models::{Category, ContactMethod};

const SECRET: &str = "test-secret-for-feed-tests";
const WAIT: Duration = Duration::from_secs(5);

struct Server {
    _dir: TempDir,
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let storage = Storage::new(dir.path().join("storage"), "http://localhost:3000")
            .await
            .unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
            storage,
            jwt_secret: SECRET.into(),
            email_domain: None,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { _dir: dir, state, addr }
    }

    /// Profile row plus a signed-in REST client.
    fn client(&self, name: &str) -> (Uuid, ApiClient) {
        let id = Uuid::new_v4();
        let email = format!("{}@campus.edu", name);
        self.state.db.ensure_user(id, &email).unwrap();
        let token = create_token(SECRET, id, &email).unwrap();
        (id, ApiClient::new(format!("http://{}", self.addr)).with_token(token))
    }

    fn listing(&self, owner: Uuid, title: &str) -> Uuid {
        let req = CreateListingRequest {
            title: title.into(),
            description: format!("{} in good shape", title),
            category: Category::Product,
            price: 2500.0,
            contact_method: ContactMethod::Email,
            phone: None,
            image_url: None,
            location: None,
            tags: Vec::new(),
        };
        self.state.db.create_listing(owner, &req).unwrap().id
    }
}

async fn next_refresh(session: &mut Session) -> Refresh {
    tokio::time::timeout(WAIT, session.next())
        .await
        .expect("no feed event in time")
        .unwrap()
        .expect("feed closed")
}

async fn next_event(feed: &mut FeedClient) -> GatewayEvent {
    tokio::time::timeout(WAIT, feed.next_event())
        .await
        .expect("no feed event in time")
        .expect("feed closed")
        .unwrap()
}

#[tokio::test]
async fn session_merges_messages_and_outsiders_see_nothing() {
    let server = Server::start().await;
    let (_buyer_id, buyer) = server.client("buyer");
    let (seller_id, seller_api) = server.client("seller");
    let (outsider_id, outsider_api) = server.client("outsider");
    let listing_id = server.listing(seller_id, "Bike");

    let conv = buyer.start_conversation(listing_id, None).await.unwrap().conversation;

    // Outsider identifies but cannot watch someone else's conversation.
    let mut outsider = FeedClient::connect(&outsider_api.gateway_url(), outsider_api.token().unwrap())
        .await
        .unwrap();
    assert_eq!(outsider.user_id(), outsider_id);
    outsider.subscribe(vec![conv.id]).await.unwrap();
    assert_eq!(
        next_event(&mut outsider).await,
        GatewayEvent::Subscribed { conversation_ids: vec![] }
    );

    let mut seller = Session::start(seller_api).await.unwrap();
    assert_eq!(seller.inbox().conversation_ids(), vec![conv.id]);
    // Subscription acknowledged, so the watched set is in place.
    assert_eq!(next_refresh(&mut seller).await, Refresh::Ignored);
    seller.open_conversation(conv.id).await.unwrap();

    buyer.send_message(conv.id, "Is the bike still available?").await.unwrap();

    let mut refreshes = Vec::new();
    while seller.inbox().messages().is_empty()
        || !refreshes.contains(&Refresh::Reload(Scope::Conversations))
        || seller.inbox().unread_notifications() < 1
    {
        refreshes.push(next_refresh(&mut seller).await);
    }
    assert!(refreshes.contains(&Refresh::Merged));
    assert_eq!(seller.inbox().messages()[0].body, "Is the bike still available?");
    let summary = &seller.inbox().conversations()[0];
    assert_eq!(summary.unread_count, 1);
    assert_eq!(
        summary.last_message.as_ref().map(|m| m.body.as_str()),
        Some("Is the bike still available?")
    );

    assert!(
        tokio::time::timeout(Duration::from_millis(300), outsider.next_event())
            .await
            .is_err()
    );

    seller.close().await.unwrap();
    outsider.close().await.unwrap();
}
