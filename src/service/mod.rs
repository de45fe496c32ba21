use async_trait::async_trait;
use serde::Serialize;

use crate::chat::{Message, User};
use crate::error::{AuthError, FetchError, SendError};
use crate::session::Session;

pub use rest::RestClient;

mod rest;

/// Body of a send call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub receiver: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request/response calls the chat view depends on.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn users(&self, token: &str) -> Result<Vec<User>, FetchError>;

    /// Full history with `peer_id`, ordered by the server.
    async fn messages(&self, peer_id: &str, token: &str) -> Result<Vec<Message>, FetchError>;

    /// Persist a message and return the server's copy, carrying its server id.
    async fn send(&self, request: &SendRequest, token: &str) -> Result<Message, SendError>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError>;
    async fn register(&self, registration: &Registration) -> Result<Session, AuthError>;
    async fn logout(&self, token: &str) -> Result<(), AuthError>;
}
