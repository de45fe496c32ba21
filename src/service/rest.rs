use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{AuthService, ChatService, Credentials, Registration, SendRequest};
use crate::chat::{Message, User, WireMessage};
use crate::config::Config;
use crate::error::{ApiError, AuthError, FetchError, SendError};
use crate::session::{AuthResponse, Session};

/// HTTP client for the `/api/auth` and `/api/chat` endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    api_url: String,
}

impl RestClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.request_timeout())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/api/auth/{}", self.api_url, path)
    }

    fn chat_url(&self, path: &str) -> String {
        format!("{}/api/chat/{}", self.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, ApiError> {
        debug!(url, "GET");
        let response = self.http.get(url).bearer_auth(token).send().await?;
        decode(response).await
    }
}

#[async_trait]
impl ChatService for RestClient {
    async fn users(&self, token: &str) -> Result<Vec<User>, FetchError> {
        Ok(self.get_json(&self.chat_url("users"), token).await?)
    }

    async fn messages(&self, peer_id: &str, token: &str) -> Result<Vec<Message>, FetchError> {
        let url = self.chat_url(&format!("messages/{}", peer_id));
        let wire: Vec<WireMessage> = self.get_json(&url, token).await?;
        Ok(wire.into_iter().map(Message::from).collect())
    }

    async fn send(&self, request: &SendRequest, token: &str) -> Result<Message, SendError> {
        let url = self.chat_url("messages");
        debug!(url, receiver = %request.receiver, "POST");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(ApiError::from)?;
        let wire: WireMessage = decode(response).await?;
        Ok(wire.into())
    }
}

#[async_trait]
impl AuthService for RestClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.auth_url("login"))
            .json(credentials)
            .send()
            .await
            .map_err(ApiError::from)?;
        let body: AuthResponse = decode(response).await?;
        info!(user = %body.name, "logged in");
        Ok(body.into())
    }

    async fn register(&self, registration: &Registration) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.auth_url("register"))
            .json(registration)
            .send()
            .await
            .map_err(ApiError::from)?;
        let body: AuthResponse = decode(response).await?;
        info!(user = %body.name, "registered");
        Ok(body.into())
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.auth_url("logout"))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(ApiError::from)?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(body)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let body = check_status(response).await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// The backend reports failures as `{"message": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.trim().to_string(),
    }
}
