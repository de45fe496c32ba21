//! Terminal client for NotebookChat, a one-to-one chat service.
//!
//! The interesting part lives in [`chat::MessageStreamReconciler`], which keeps
//! the open thread consistent while history fetches, optimistic sends and
//! realtime pushes race each other. Everything else wires it to the backend
//! ([`service`], [`realtime`]) and to the terminal ([`app`], [`ui`]).

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod realtime;
pub mod service;
pub mod session;
pub mod ui;

pub use chat::{Conversation, Message, MessageId, MessageStreamReconciler};
pub use config::Config;
pub use session::{Session, SessionStore};
