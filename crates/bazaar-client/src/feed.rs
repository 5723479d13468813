use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bazaar_types::events::{GatewayCommand, GatewayEvent};

use crate::error::{ClientError, Result};

const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener end of the change feed.
///
/// The socket closes when this value is dropped, so a session going away
/// never leaves a subscription behind on the server.
pub struct FeedClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    user_id: Uuid,
}

impl FeedClient {
    /// Connect, identify with `token`, and wait for the server's Ready.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        info!("Connecting to feed at {}", url);
        let (mut ws, _) = connect_async(url).await?;

        send_command(
            &mut ws,
            &GatewayCommand::Identify {
                token: token.to_string(),
            },
        )
        .await?;

        let ready = tokio::time::timeout(READY_TIMEOUT, async {
            while let Some(msg) = ws.next().await {
                if let Message::Text(text) = msg? {
                    if let Ok(GatewayEvent::Ready { user_id, .. }) = serde_json::from_str(text.as_str()) {
                        return Ok(Some(user_id));
                    }
                }
            }
            Ok::<_, ClientError>(None)
        })
        .await
        .map_err(|_| ClientError::Handshake("no Ready within timeout".into()))??;

        let user_id = ready.ok_or_else(|| ClientError::Handshake("socket closed before Ready".into()))?;
        debug!("Feed ready for {}", user_id);
        Ok(Self { ws, user_id })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Watch these conversations; replaces the previous set.
    pub async fn subscribe(&mut self, conversation_ids: Vec<Uuid>) -> Result<()> {
        send_command(&mut self.ws, &GatewayCommand::Subscribe { conversation_ids }).await
    }

    /// Next event from the server, or `None` once the socket is closed.
    pub async fn next_event(&mut self) -> Option<Result<GatewayEvent>> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => warn!("Unreadable feed event: {}", e),
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

async fn send_command(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    cmd: &GatewayCommand,
) -> Result<()> {
    let json = serde_json::to_string(cmd)?;
    ws.send(Message::Text(json.into())).await?;
    Ok(())
}
