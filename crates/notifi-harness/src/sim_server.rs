//! In-memory chat server for simulation.
//!
//! Implements the server side of the REST API the client talks to: accounts
//! and bearer tokens, newest-first cursor pagination over a growing message
//! log, and message posting. It also plays the live endpoint: every posted
//! message is fanned out to each subscribed channel of every attached client,
//! and tests can take the endpoint down and bring it back.
//!
//! Errors are returned as the text the real server puts in its `error`
//! field.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use notifi_app::Upload;
use notifi_core::ChannelId;
use notifi_proto::{Attachment, AuthResponse, Credentials, Message, MessageId, MessagePage};
use tracing::{debug, warn};

/// Minutes between consecutive message timestamps.
const MINUTES_PER_MESSAGE: u64 = 37;

/// Server shared between the simulated driver and the test.
pub type SharedSimServer = Arc<Mutex<SimServer>>;

/// Create a server ready to be shared.
pub fn create_shared_server(server: SimServer) -> SharedSimServer {
    Arc::new(Mutex::new(server))
}

struct Account {
    user_id: u64,
    password: String,
}

/// In-memory server state.
pub struct SimServer {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, u64>,
    emails: HashMap<u64, String>,
    messages: Vec<Message>,
    next_user_id: u64,
    next_message_id: MessageId,
    next_attachment_id: u64,
    issued_tokens: u64,
    failing_fetches: u32,
    live_available: bool,
    next_client_id: u64,
    subscriptions: BTreeMap<u64, BTreeSet<ChannelId>>,
    inboxes: HashMap<u64, VecDeque<(ChannelId, String)>>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Empty server with no accounts and no messages.
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            tokens: HashMap::new(),
            emails: HashMap::new(),
            messages: Vec::new(),
            next_user_id: 1,
            next_message_id: 1,
            next_attachment_id: 1,
            issued_tokens: 0,
            failing_fetches: 0,
            live_available: true,
            next_client_id: 1,
            subscriptions: BTreeMap::new(),
            inboxes: HashMap::new(),
        }
    }

    /// Server with `count` messages already posted by `author`.
    pub fn with_history(count: usize, author: &str) -> Self {
        let mut server = Self::new();
        let user_id = server.create_account(author, "password");
        for n in 1..=count {
            server.append(user_id, format!("history {n}"), &[]);
        }
        server
    }

    /// `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// Returns the server's error text if the email is taken or a field is
    /// blank.
    pub fn register(&mut self, credentials: &Credentials) -> Result<AuthResponse, String> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err("Email and password are required".to_string());
        }
        if self.accounts.contains_key(&credentials.email) {
            return Err("Email already registered".to_string());
        }
        let user_id = self.create_account(&credentials.email, &credentials.password);
        Ok(self.issue_token(user_id))
    }

    /// `POST /auth/login`.
    ///
    /// # Errors
    ///
    /// Returns the server's error text if the credentials do not match.
    pub fn login(&mut self, credentials: &Credentials) -> Result<AuthResponse, String> {
        let user_id = match self.accounts.get(&credentials.email) {
            Some(account) if account.password == credentials.password => account.user_id,
            _ => return Err("Invalid credentials".to_string()),
        };
        Ok(self.issue_token(user_id))
    }

    /// `GET /messages?limit=..&before=..`.
    ///
    /// Returns the newest `limit` messages older than `before`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the server's error text for a bad token or an injected failure.
    pub fn history(
        &mut self,
        token: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<MessagePage, String> {
        self.authorize(token)?;
        if self.failing_fetches > 0 {
            self.failing_fetches -= 1;
            return Err("Internal server error".to_string());
        }

        let before = match before {
            Some(cursor) => Some(cursor.parse::<MessageId>().map_err(|_| "Invalid cursor")?),
            None => None,
        };
        let older: Vec<&Message> =
            self.messages.iter().filter(|m| before.is_none_or(|b| m.id < b)).collect();
        let skip = older.len().saturating_sub(limit as usize);
        let messages: Vec<Message> = older[skip..].iter().map(|m| (*m).clone()).collect();
        let has_more = skip > 0;
        let next_cursor = if has_more { messages.first().map(|m| m.id.to_string()) } else { None };

        debug!(limit, ?before, returned = messages.len(), has_more, "history page");
        Ok(MessagePage { messages, has_more, next_cursor })
    }

    /// `POST /messages`.
    ///
    /// # Errors
    ///
    /// Returns the server's error text for a bad token or an empty message.
    pub fn post(
        &mut self,
        token: &str,
        body: &str,
        attachments: &[Upload],
    ) -> Result<Message, String> {
        let user_id = self.authorize(token)?;
        if body.trim().is_empty() && attachments.is_empty() {
            return Err("Message body or attachment required".to_string());
        }
        Ok(self.append(user_id, body.to_string(), attachments))
    }

    /// Post as `email` without a token, creating the account if needed.
    pub fn post_as(&mut self, email: &str, body: &str) -> Message {
        let user_id = match self.accounts.get(email) {
            Some(account) => account.user_id,
            None => self.create_account(email, "password"),
        };
        self.append(user_id, body.to_string(), &[])
    }

    /// User id a token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `"Unauthorized"` for an unknown token.
    pub fn authorize(&self, token: &str) -> Result<u64, String> {
        self.tokens.get(token).copied().ok_or_else(|| "Unauthorized".to_string())
    }

    /// Invalidate every issued token.
    pub fn revoke_all_tokens(&mut self) {
        self.tokens.clear();
    }

    /// Fail the next `count` history requests.
    pub fn fail_next_fetches(&mut self, count: u32) {
        self.failing_fetches = count;
    }

    /// Whether the live endpoint accepts connections.
    pub fn live_available(&self) -> bool {
        self.live_available
    }

    /// Take the live endpoint down or bring it back.
    pub fn set_live_available(&mut self, available: bool) {
        self.live_available = available;
    }

    /// Register a client process. Returns its id for the live endpoint.
    pub fn attach_client(&mut self) -> u64 {
        let client = self.next_client_id;
        self.next_client_id += 1;
        client
    }

    /// Accept a live channel for `client`.
    ///
    /// # Errors
    ///
    /// Returns the refusal reason while the live endpoint is down.
    pub fn subscribe(&mut self, client: u64, channel: ChannelId) -> Result<(), String> {
        if !self.live_available {
            return Err("connection refused".to_string());
        }
        self.subscriptions.entry(client).or_default().insert(channel);
        Ok(())
    }

    /// Forget a live channel of `client`.
    pub fn unsubscribe(&mut self, client: u64, channel: ChannelId) {
        if let Some(channels) = self.subscriptions.get_mut(&client) {
            channels.remove(&channel);
        }
    }

    /// Drop every live channel of `client`, returning them.
    pub fn drop_subscriptions(&mut self, client: u64) -> Vec<ChannelId> {
        self.subscriptions.remove(&client).map(|c| c.into_iter().collect()).unwrap_or_default()
    }

    /// Live channels `client` holds.
    pub fn subscriptions(&self, client: u64) -> usize {
        self.subscriptions.get(&client).map_or(0, BTreeSet::len)
    }

    /// Frames waiting for `client`, in delivery order.
    pub fn take_deliveries(&mut self, client: u64) -> Vec<(ChannelId, String)> {
        self.inboxes.remove(&client).map(Vec::from).unwrap_or_default()
    }

    /// Push `message` again to every live channel.
    pub fn redeliver(&mut self, message: &Message) {
        self.broadcast(message);
    }

    /// Every message, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn create_account(&mut self, email: &str, password: &str) -> u64 {
        let user_id = self.next_user_id;
        self.next_user_id += 1;
        self.accounts.insert(email.to_string(), Account { user_id, password: password.to_string() });
        self.emails.insert(user_id, email.to_string());
        user_id
    }

    fn issue_token(&mut self, user_id: u64) -> AuthResponse {
        self.issued_tokens += 1;
        let token = format!("token-{user_id}-{}", self.issued_tokens);
        self.tokens.insert(token.clone(), user_id);
        AuthResponse { token, user_id }
    }

    fn append(&mut self, user_id: u64, body: String, uploads: &[Upload]) -> Message {
        let id = self.next_message_id;
        self.next_message_id += 1;

        let attachments = uploads
            .iter()
            .map(|upload| {
                let attachment_id = self.next_attachment_id;
                self.next_attachment_id += 1;
                Attachment {
                    id: attachment_id,
                    filename: upload.filename.clone(),
                    mime_type: upload.mime_type.clone(),
                    url: format!("/uploads/{attachment_id}/{}", upload.filename),
                    path: None,
                }
            })
            .collect();

        let message = Message {
            id,
            body,
            timestamp: timestamp_for(id),
            author_user_id: user_id,
            author_email: self.emails.get(&user_id).cloned().unwrap_or_default(),
            attachments,
        };
        self.messages.push(message.clone());
        self.broadcast(&message);
        message
    }

    fn broadcast(&mut self, message: &Message) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(id = message.id, error = %e, "cannot encode broadcast");
                return;
            },
        };
        for (client, channels) in &self.subscriptions {
            let inbox = self.inboxes.entry(*client).or_default();
            inbox.extend(channels.iter().map(|channel| (*channel, text.clone())));
        }
    }
}

/// ISO-8601 timestamp of message `id`, starting 2024-05-01T00:00:00Z.
fn timestamp_for(id: MessageId) -> String {
    let minutes = id * MINUTES_PER_MESSAGE;
    let day = 1 + (minutes / 1440) % 28;
    let hour = (minutes / 60) % 24;
    let minute = minutes % 60;
    format!("2024-05-{day:02}T{hour:02}:{minute:02}:00Z")
}
