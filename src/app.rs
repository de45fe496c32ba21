use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::{
    ConfirmOutcome, Conversation, IgnoreReason, LocalId, Message, MessageStreamReconciler,
    PushOutcome, Roster, RollbackOutcome, ThreadChange, User,
};
use crate::config::Config;
use crate::error::{FetchError, SendError};
use crate::realtime::{ChannelEvent, ChannelHandle};
use crate::service::{ChatService, SendRequest};
use crate::session::Session;

const MAX_STATUS_MESSAGES: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Connecting,
    Connected,
    Offline,
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabCompletionState {
    /// Input line before the completed word.
    pub head: String,
    pub matches: Vec<String>,
    pub current_match_index: usize,
}

/// Completion of background work, handled one at a time by the event loop.
#[derive(Debug)]
pub enum AppEvent {
    UsersLoaded(Result<Vec<User>, FetchError>),
    HistoryLoaded {
        conversation: Conversation,
        generation: u64,
        result: Result<Vec<Message>, FetchError>,
    },
    SendFinished {
        conversation: Conversation,
        generation: u64,
        local_id: LocalId,
        body: String,
        result: Result<Message, SendError>,
    },
    Channel(ChannelEvent),
}

pub struct App {
    pub should_quit: bool,
    pub logout_requested: bool,
    pub state: AppState,
    pub input_mode: InputMode,
    pub input: String,
    /// Cursor position in characters, not bytes.
    pub cursor_position: usize,
    /// Messages scrolled up from the bottom of the thread.
    pub scroll_offset: usize,
    pub tab_completion_state: Option<TabCompletionState>,

    pub session: Session,
    pub roster: Roster,
    pub thread: MessageStreamReconciler,
    pub loading_history: bool,
    /// The last history fetch for the open conversation failed.
    pub history_failed: bool,
    pub status_messages: Vec<String>,

    /// Bumped every time a conversation is (re)opened. Background results
    /// carry the value they were started under.
    generation: u64,
    thread_changes: mpsc::UnboundedReceiver<ThreadChange>,
    chat: Arc<dyn ChatService>,
    channel: Option<ChannelHandle>,
    broadcast_sends: bool,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    event_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl App {
    pub fn new(session: Session, chat: Arc<dyn ChatService>, config: &Config) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (change_tx, thread_changes) = mpsc::unbounded_channel();

        let mut app = Self {
            should_quit: false,
            logout_requested: false,
            state: AppState::Offline,
            input_mode: InputMode::Normal,
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            tab_completion_state: None,

            session,
            roster: Roster::new(),
            thread: MessageStreamReconciler::with_notifier(change_tx),
            loading_history: false,
            history_failed: false,
            status_messages: Vec::new(),

            generation: 0,
            thread_changes,
            chat,
            channel: None,
            broadcast_sends: config.broadcast_sends,
            event_tx,
            event_rx,
        };

        app.add_status_message(format!(
            "Signed in as {}. Use /open <name> to start chatting, /help for commands.",
            app.session.user.name
        ));
        app
    }

    /// Route channel events into the app's event queue and keep the emit handle.
    pub fn attach_channel(
        &mut self,
        handle: ChannelHandle,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(AppEvent::Channel(event)).is_err() {
                    break;
                }
            }
        });
        self.channel = Some(handle);
        self.state = AppState::Connecting;
    }

    pub fn detach_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.state = AppState::Offline;
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.thread.conversation()
    }

    pub fn selected_peer(&self) -> Option<&User> {
        self.conversation().and_then(|c| self.roster.get(&c.peer))
    }

    /// Fetch the roster in the background.
    pub fn load_users(&self) {
        let chat = Arc::clone(&self.chat);
        let token = self.session.token.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = chat.users(&token).await;
            let _ = tx.send(AppEvent::UsersLoaded(result));
        });
    }

    /// Open the conversation with `peer_id` and fetch its history.
    ///
    /// Selecting the open conversation again only refetches when its last
    /// history fetch failed.
    pub fn select_peer(&mut self, peer_id: &str) {
        let conversation = Conversation::new(self.session.user_id(), peer_id);
        if self.thread.conversation() == Some(&conversation) && !self.history_failed {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.thread.open(conversation.clone());
        self.roster.clear_unread(peer_id);
        self.loading_history = true;
        self.history_failed = false;
        self.apply_thread_changes();

        let chat = Arc::clone(&self.chat);
        let token = self.session.token.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = chat.messages(&conversation.peer, &token).await;
            let _ = tx.send(AppEvent::HistoryLoaded {
                conversation,
                generation,
                result,
            });
        });
    }

    /// Show `body` right away and send it in the background.
    ///
    /// Returns false if nothing was sent: the body is empty, no conversation
    /// is open, or its history has not been loaded.
    pub fn send_message(&mut self, body: &str) -> bool {
        let body = body.trim();
        if body.is_empty() {
            return false;
        }
        let Some(conversation) = self.thread.conversation().cloned() else {
            self.add_status_message("No conversation open. Use /open <name> first.".to_string());
            return false;
        };
        if self.loading_history {
            self.add_status_message("Conversation is still loading, try again in a moment.".to_string());
            return false;
        }
        if self.history_failed {
            self.add_status_message("Conversation did not load. Reopen it before sending.".to_string());
            return false;
        }
        let Some(local_id) = self.thread.begin_optimistic_send(body) else {
            return false;
        };
        self.scroll_offset = 0;
        self.apply_thread_changes();
        let generation = self.generation;

        let chat = Arc::clone(&self.chat);
        let token = self.session.token.clone();
        let tx = self.event_tx.clone();
        let request = SendRequest {
            receiver: conversation.peer.clone(),
            message: body.to_string(),
        };
        tokio::spawn(async move {
            let result = chat.send(&request, &token).await;
            let _ = tx.send(AppEvent::SendFinished {
                conversation,
                generation,
                local_id,
                body: request.message,
                result,
            });
        });
        true
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.event_rx.recv().await
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::UsersLoaded(Ok(users)) => {
                self.roster.replace(users, self.session.user_id());
                self.add_status_message(format!("{} users available", self.roster.len()));
            }
            AppEvent::UsersLoaded(Err(e)) => {
                warn!("roster fetch failed: {}", e);
                self.add_status_message(format!("Could not load users: {}", e));
            }
            AppEvent::HistoryLoaded {
                conversation,
                generation,
                result,
            } => self.on_history_loaded(conversation, generation, result),
            AppEvent::SendFinished {
                conversation,
                generation,
                local_id,
                body,
                result,
            } => self.on_send_finished(conversation, generation, local_id, body, result),
            AppEvent::Channel(event) => self.on_channel_event(event),
        }
        self.apply_thread_changes();
    }

    /// Keep the viewport steady while the thread changes underneath it.
    fn apply_thread_changes(&mut self) {
        while let Ok(change) = self.thread_changes.try_recv() {
            match change {
                ThreadChange::Reset { .. } => self.scroll_offset = 0,
                ThreadChange::Appended { .. } if self.scroll_offset > 0 => {
                    self.scroll_offset += 1;
                }
                ThreadChange::Appended { .. } | ThreadChange::Replaced { .. } => {}
                ThreadChange::Removed { .. } => {
                    self.scroll_offset = self.scroll_offset.min(self.thread.len());
                }
            }
        }
    }

    fn on_history_loaded(
        &mut self,
        conversation: Conversation,
        generation: u64,
        result: Result<Vec<Message>, FetchError>,
    ) {
        if generation != self.generation {
            debug!(peer = %conversation.peer, generation, "dropping history from an earlier open");
            return;
        }
        self.loading_history = false;
        match result {
            Ok(messages) => self.thread.reset(messages),
            Err(e) => {
                self.history_failed = true;
                warn!(peer = %conversation.peer, "history fetch failed: {}", e);
                self.add_status_message(format!("{}. Reopen the conversation to retry.", e));
            }
        }
    }

    fn on_send_finished(
        &mut self,
        conversation: Conversation,
        generation: u64,
        local_id: LocalId,
        body: String,
        result: Result<Message, SendError>,
    ) {
        if generation != self.generation {
            debug!(peer = %conversation.peer, %local_id, "dropping send result from an earlier open");
            return;
        }

        match result {
            Ok(server_message) => {
                let broadcast = self.broadcast_sends.then(|| server_message.clone());
                match self.thread.confirm_send(local_id, server_message) {
                    ConfirmOutcome::Confirmed => {
                        if let (Some(channel), Some(message)) = (&self.channel, broadcast) {
                            if let Err(e) = channel.emit_send(&message) {
                                warn!("broadcast of {} failed: {}", message.id, e);
                            }
                        }
                    }
                    ConfirmOutcome::NotFound => {
                        if self.thread.fail_send(local_id) == RollbackOutcome::RolledBack {
                            self.add_status_message(
                                "Server reply did not match the message sent.".to_string(),
                            );
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%local_id, "send failed: {}", e);
                self.thread.fail_send(local_id);
                if self.input.is_empty() {
                    self.set_input(&body);
                }
                self.add_status_message(format!("{}. Press i then Enter to retry.", e));
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.state = AppState::Connected;
                self.add_status_message("Realtime channel connected".to_string());
            }
            ChannelEvent::Disconnected(reason) => {
                self.add_status_message(format!("Realtime channel lost: {}", reason));
                self.state = AppState::Disconnected(reason);
            }
            ChannelEvent::MessageReceived(message) => {
                let sender = message.sender_id.clone();
                let to_me = message.receiver_id == self.session.user_id();
                match self.thread.apply_remote_push(message) {
                    PushOutcome::Applied => {}
                    PushOutcome::Ignored(
                        IgnoreReason::OtherConversation | IgnoreReason::NoConversation,
                    ) if to_me => self.roster.mark_unread(&sender),
                    PushOutcome::Ignored(_) => {}
                }
            }
        }
    }

    pub async fn on_tick(&mut self) -> Result<()> {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
        Ok(())
    }

    pub async fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key_event(key).await?;
            }
        }
        Ok(())
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        if key.code != KeyCode::Tab {
            self.tab_completion_state = None;
        }

        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('i') | KeyCode::Enter => self.input_mode = InputMode::Editing,
                KeyCode::Up => self.scroll_up(1),
                KeyCode::Down => self.scroll_down(1),
                KeyCode::PageUp => self.scroll_up(10),
                KeyCode::PageDown => self.scroll_down(10),
                _ => {}
            },
            InputMode::Editing => match key.code {
                KeyCode::Enter => {
                    self.submit_input().await?;
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Tab => self.complete_name(),
                KeyCode::Char(c) => {
                    let at = self.byte_index();
                    self.input.insert(at, c);
                    self.cursor_position += 1;
                }
                KeyCode::Backspace => {
                    if self.cursor_position > 0 {
                        self.cursor_position -= 1;
                        let at = self.byte_index();
                        self.input.remove(at);
                    }
                }
                KeyCode::Delete => {
                    if self.cursor_position < self.input.chars().count() {
                        let at = self.byte_index();
                        self.input.remove(at);
                    }
                }
                KeyCode::Left => self.cursor_position = self.cursor_position.saturating_sub(1),
                KeyCode::Right => {
                    if self.cursor_position < self.input.chars().count() {
                        self.cursor_position += 1;
                    }
                }
                KeyCode::Home => self.cursor_position = 0,
                KeyCode::End => self.cursor_position = self.input.chars().count(),
                KeyCode::Esc => self.input_mode = InputMode::Normal,
                _ => {}
            },
        }
        Ok(())
    }

    async fn submit_input(&mut self) -> Result<()> {
        let input = self.input.trim().to_string();
        if input.is_empty() {
            return Ok(());
        }

        if input.starts_with('/') {
            self.set_input("");
            self.handle_command(&input).await?;
        } else if self.send_message(&input) {
            self.set_input("");
        }
        Ok(())
    }

    async fn handle_command(&mut self, input: &str) -> Result<()> {
        let mut parts = input[1..].splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let argument = parts.next().map(str::trim).unwrap_or_default();

        match command.as_str() {
            "open" | "o" | "msg" => {
                if argument.is_empty() {
                    self.add_status_message("Usage: /open <name|number>".to_string());
                    return Ok(());
                }
                match self.roster.find(argument).cloned() {
                    Some(user) => {
                        self.select_peer(&user.id);
                        self.add_status_message(format!("Chatting with {}", user.name));
                    }
                    None => self.add_status_message(format!("No user matches {}", argument)),
                }
            }
            "users" | "u" => {
                self.load_users();
                self.add_status_message("Refreshing users...".to_string());
            }
            "help" | "h" => self.show_help(),
            "logout" => {
                info!("logout requested");
                self.logout_requested = true;
                self.should_quit = true;
            }
            "quit" | "q" | "exit" => self.should_quit = true,
            _ => self.add_status_message(format!(
                "Unknown command: /{}. Type /help for available commands.",
                command
            )),
        }
        Ok(())
    }

    fn show_help(&mut self) {
        let help_text = [
            "Commands:",
            "/open <name|number> - Open the conversation with a user",
            "/users - Reload the user list",
            "/logout - Sign out and forget the saved session",
            "/help - Show this help",
            "/quit - Exit",
            "",
            "Keys: i=type, Esc=stop typing, Enter=send, Tab=complete name",
            "Up/Down=scroll, PageUp/PageDown=fast scroll, q=quit",
        ];
        for line in help_text {
            self.add_status_message(line.to_string());
        }
    }

    /// Complete the word under the cursor to a roster name, cycling on repeated Tab.
    fn complete_name(&mut self) {
        if let Some(state) = self.tab_completion_state.as_mut() {
            state.current_match_index = (state.current_match_index + 1) % state.matches.len();
            let line = format!("{}{}", state.head, state.matches[state.current_match_index]);
            self.set_input(&line);
            return;
        }

        let (head, word) = match self.input.rfind(char::is_whitespace) {
            Some(pos) => self.input.split_at(pos + 1),
            None => ("", self.input.as_str()),
        };
        if word.is_empty() {
            return;
        }
        let matches = self.roster.matching_names(word);
        if matches.is_empty() {
            return;
        }

        let head = head.to_string();
        let line = format!("{}{}", head, matches[0]);
        self.set_input(&line);
        if matches.len() > 1 {
            self.tab_completion_state = Some(TabCompletionState {
                head,
                matches,
                current_match_index: 0,
            });
        }
    }

    fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.cursor_position = self.input.chars().count();
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.thread.len());
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn add_status_message(&mut self, message: String) {
        debug!(status = %message);
        self.status_messages
            .push(format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message));

        if self.status_messages.len() > MAX_STATUS_MESSAGES {
            let excess = self.status_messages.len() - MAX_STATUS_MESSAGES;
            self.status_messages.drain(0..excess);
        }
    }

    /// The last `height` messages above the scroll position.
    pub fn visible_messages(&self, height: usize) -> &[Message] {
        let messages = self.thread.messages();
        let end = messages.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        &messages[start..end]
    }

    pub fn visible_status_messages(&self, height: usize) -> &[String] {
        let start = self.status_messages.len().saturating_sub(height);
        &self.status_messages[start..]
    }
}
