use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};

use bazaar_gateway::connection;

use crate::middleware::{bearer_token, require_auth};
use crate::state::AppState;
use crate::storage::MAX_OBJECT_SIZE;
use crate::{
    auth, conversations, favorites, files, listings, messages, notifications, ratings, users,
};

/// Every route of the service. Layers for tracing and CORS are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/listings", get(listings::search_listings))
        .route("/listings/{listing_id}", get(listings::get_listing))
        .route("/users/{user_id}", get(users::get_profile))
        .route("/users/{user_id}/ratings", get(ratings::list_ratings))
        .route("/storage/{bucket}/{*path}", get(files::download_object))
        .route("/gateway", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/me", get(users::me))
        .route("/me/profile", patch(users::update_profile))
        .route("/me/premium", post(users::upgrade_premium))
        .route("/me/favorites", get(favorites::list_favorites))
        .route("/listings", post(listings::create_listing))
        .route(
            "/listings/{listing_id}",
            patch(listings::update_listing).delete(listings::delete_listing),
        )
        .route("/listings/{listing_id}/sold", post(listings::mark_sold))
        .route("/listings/{listing_id}/feature", post(listings::feature_listing))
        .route("/listings/{listing_id}/view", post(listings::record_view))
        .route("/listings/{listing_id}/analytics", get(listings::analytics))
        .route(
            "/listings/{listing_id}/favorite",
            get(favorites::favorite_status).post(favorites::toggle_favorite),
        )
        .route("/users/{user_id}/ratings", post(ratings::add_rating))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route("/conversations/unread-count", get(messages::unread_count))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(messages::mark_read))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route(
            "/notifications/{notification_id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/storage/{bucket}/{*path}",
            post(files::upload_object).layer(DefaultBodyLimit::max(MAX_OBJECT_SIZE * 2)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// A bearer token on the upgrade request skips the Identify handshake.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = bearer_token(&headers)
        .and_then(|token| connection::verify_token(token, &state.jwt_secret));
    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();

    ws.on_upgrade(move |socket| async move {
        match claims {
            Some(claims) => {
                connection::handle_connection_authenticated(socket, dispatcher, db, claims.sub, claims.email)
                    .await
            }
            None => connection::handle_connection(socket, dispatcher, db, jwt_secret).await,
        }
    })
}
