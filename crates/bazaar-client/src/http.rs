use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use bazaar_types::api::{
    ConversationResponse, ConversationSummary, LoginRequest, LoginResponse, MarkReadResponse,
    NotificationResponse, RegisterRequest, RegisterResponse, SendMessageRequest,
    StartConversationRequest, UnreadCountResponse,
};
use bazaar_types::models::{Message, User};

use crate::error::{ClientError, Result};

/// REST client for the marketplace API. Holds the bearer token once signed
/// in; signing out just forgets it.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of the change feed on the same host.
    pub fn gateway_url(&self) -> String {
        let ws = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/gateway", ws)
    }

    // -- Identity --

    pub async fn register(&mut self, email: &str, password: &str) -> Result<RegisterResponse> {
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: RegisterResponse = self.json(self.request(Method::POST, "/auth/register").json(&body)).await?;
        self.token = Some(res.token.clone());
        Ok(res)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: LoginResponse = self.json(self.request(Method::POST, "/auth/login").json(&body)).await?;
        self.token = Some(res.token.clone());
        Ok(res)
    }

    pub fn sign_out(&mut self) {
        self.token = None;
    }

    pub async fn me(&self) -> Result<User> {
        self.json(self.authed(Method::GET, "/me")?).await
    }

    // -- Conversations --

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.json(self.authed(Method::GET, "/conversations")?).await
    }

    pub async fn start_conversation(&self, listing_id: Uuid, message: Option<&str>) -> Result<ConversationResponse> {
        let body = StartConversationRequest {
            listing_id,
            message: message.map(str::to_string),
        };
        self.json(self.authed(Method::POST, "/conversations")?.json(&body)).await
    }

    pub async fn get_conversation(&self, conversation_id: Uuid) -> Result<ConversationResponse> {
        self.json(self.authed(Method::GET, &format!("/conversations/{}", conversation_id))?)
            .await
    }

    pub async fn send_message(&self, conversation_id: Uuid, body: &str) -> Result<Message> {
        let req = SendMessageRequest {
            body: body.to_string(),
        };
        self.post_json(&format!("/conversations/{}/messages", conversation_id), &req)
            .await
    }

    pub async fn mark_read(&self, conversation_id: Uuid) -> Result<usize> {
        let res: MarkReadResponse = self
            .json(self.authed(Method::POST, &format!("/conversations/{}/read", conversation_id))?)
            .await?;
        Ok(res.updated)
    }

    // -- Notifications --

    pub async fn list_notifications(&self) -> Result<Vec<NotificationResponse>> {
        self.json(self.authed(Method::GET, "/notifications")?).await
    }

    pub async fn unread_notifications(&self) -> Result<i64> {
        let res: UnreadCountResponse = self
            .json(self.authed(Method::GET, "/notifications/unread-count")?)
            .await?;
        Ok(res.unread)
    }

    pub async fn mark_notification_read(&self, notification_id: Uuid) -> Result<()> {
        self.empty(self.authed(Method::POST, &format!("/notifications/{}/read", notification_id))?)
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.empty(self.authed(Method::POST, "/notifications/read-all")?)
            .await
    }

    pub async fn delete_notification(&self, notification_id: Uuid) -> Result<()> {
        self.empty(self.authed(Method::DELETE, &format!("/notifications/{}", notification_id))?)
            .await
    }

    // -- Plumbing --

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::NotSignedIn)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.json(self.authed(Method::POST, path)?.json(body)).await
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let res = check(req.send().await?).await?;
        Ok(res.json().await?)
    }

    async fn empty(&self, req: RequestBuilder) -> Result<()> {
        check(req.send().await?).await?;
        Ok(())
    }
}

/// Turn non-2xx responses into `ClientError::Api` with the server's message.
async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = match res.json::<serde_json::Value>().await {
        Ok(body) => body["error"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_follows_scheme() {
        assert_eq!(ApiClient::new("http://localhost:3000/").gateway_url(), "ws://localhost:3000/gateway");
        assert_eq!(ApiClient::new("https://bazaar.campus.edu").gateway_url(), "wss://bazaar.campus.edu/gateway");
    }

    #[test]
    fn authed_requests_need_a_token() {
        let client = ApiClient::new("http://localhost:3000");
        assert!(matches!(client.authed(Method::GET, "/me"), Err(ClientError::NotSignedIn)));

        let mut client = client.with_token("t");
        assert!(client.authed(Method::GET, "/me").is_ok());
        client.sign_out();
        assert!(client.token().is_none());
    }
}
