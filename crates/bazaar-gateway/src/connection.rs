use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bazaar_db::Database;
use bazaar_types::api::Claims;
use bazaar_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::feed::FeedSubscription;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Decode and validate a bearer token.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Handle a connection whose token was validated at the HTTP upgrade.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    email: String,
) {
    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, dispatcher, db, user_id, email).await;
}

/// Handle a connection that authenticates with an Identify command.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("Feed client failed to identify, closing");
        return;
    };

    run_connection(sender, receiver, dispatcher, db, claims.sub, claims.email).await;
}

async fn run_connection(
    mut sender: WsSender,
    mut receiver: WsReceiver,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    email: String,
) {
    // Registered from here on; released when `feed` drops on any return.
    let mut feed = dispatcher.open(user_id);
    info!("{} ({}) connected to feed", email, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        email: email.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            event = feed.next() => {
                let Some(event) = event else { break };
                if !send_event(&mut sender, &event).await {
                    break;
                }
            }
            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => {
                            if !handle_command(&mut sender, &mut feed, &db, cmd).await {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                email,
                                user_id,
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                        }
                    },
                    Message::Pong(_) => pong_received = true,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if pong_received {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout for {} (missed {} pongs), dropping connection", user_id, missed_heartbeats);
                        break;
                    }
                }
                pong_received = false;
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let db_touch = db.clone();
    match tokio::task::spawn_blocking(move || db_touch.touch_last_active(user_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("last_active update failed for {}: {}", user_id, e),
        Err(e) => warn!("last_active update task failed for {}: {}", user_id, e),
    }
    info!("{} ({}) disconnected from feed", email, user_id);
}

async fn wait_for_identify(receiver: &mut WsReceiver, jwt_secret: &str) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str(&text) {
                    return verify_token(&token, jwt_secret);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Returns false when the socket is gone.
async fn handle_command(
    sender: &mut WsSender,
    feed: &mut FeedSubscription,
    db: &Arc<Database>,
    cmd: GatewayCommand,
) -> bool {
    match cmd {
        GatewayCommand::Identify { .. } => true,

        GatewayCommand::Subscribe { conversation_ids } => {
            let user_id = feed.user_id();
            let requested = conversation_ids.len();
            let db = db.clone();
            let allowed = tokio::task::spawn_blocking(move || {
                db.participating_in(user_id, &conversation_ids)
            })
            .await;

            let allowed = match allowed {
                Ok(Ok(ids)) => ids,
                Ok(Err(e)) => {
                    warn!("Subscribe lookup failed for {}: {}", user_id, e);
                    Vec::new()
                }
                Err(e) => {
                    warn!("Subscribe task failed for {}: {}", user_id, e);
                    Vec::new()
                }
            };

            if allowed.len() < requested {
                debug!(
                    "{} asked for {} conversations, {} allowed",
                    user_id,
                    requested,
                    allowed.len()
                );
            }
            feed.watch(allowed.iter().copied());
            send_event(
                sender,
                &GatewayEvent::Subscribed {
                    conversation_ids: allowed,
                },
            )
            .await
        }
    }
}

/// Returns false when the socket is gone.
async fn send_event(sender: &mut WsSender, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode feed event: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn token(secret: &str, exp: usize) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let claims = Claims {
            sub,
            email: "asha@campus.edu".into(),
            exp,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
        (sub, token)
    }

    #[test]
    fn valid_token_yields_claims() {
        let exp = (Utc::now().timestamp() + 3600) as usize;
        let (sub, t) = token("secret", exp);
        let claims = verify_token(&t, "secret").unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.email, "asha@campus.edu");
    }

    #[test]
    fn wrong_secret_or_expired_token_is_rejected() {
        let exp = (Utc::now().timestamp() + 3600) as usize;
        let (_, t) = token("secret", exp);
        assert!(verify_token(&t, "other").is_none());

        let expired = (Utc::now().timestamp() - 3600) as usize;
        let (_, t) = token("secret", expired);
        assert!(verify_token(&t, "secret").is_none());
    }
}
