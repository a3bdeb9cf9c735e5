//! Network driver for the line-based client.
//!
//! Implements [`Driver`] with reqwest for the REST calls, one
//! tokio-tungstenite task per live channel and stdin lines for user input.
//! Every request runs in its own task and reports back through a single input
//! queue, so [`NetworkDriver::next_input`] is the only place the runtime
//! waits.

use std::{
    collections::{HashMap, VecDeque},
    io::{self, Stdout, Write},
    path::Path,
    time::Instant,
};

use notifi_app::{App, AppEvent, AuthMode, ChannelCommand, ChannelEvent, Driver, Input, Upload};
use notifi_core::{ChannelId, FetchRequest, FetchTicket, ScrollCommand};
use notifi_proto::Credentials;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::AbortHandle,
};
use tracing::{debug, warn};

use crate::{
    command::{self, Command},
    http::ApiClient,
    terminal::TerminalView,
    token_store::TokenStore,
    transport::LiveChannel,
};

/// Network driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Terminal output failed.
    #[error("terminal I/O error: {0}")]
    Terminal(#[source] io::Error),

    /// Token file could not be written.
    #[error("token store error: {0}")]
    TokenStore(#[source] io::Error),
}

/// Driver backed by the real network and the terminal.
pub struct NetworkDriver<W = Stdout> {
    api: ApiClient,
    tokens: TokenStore,
    events: mpsc::UnboundedSender<Input>,
    inputs: mpsc::UnboundedReceiver<Input>,
    lines: mpsc::UnboundedReceiver<String>,
    queued: VecDeque<Input>,
    channels: HashMap<ChannelId, LiveChannel>,
    fetches: HashMap<FetchTicket, AbortHandle>,
    requests: Vec<AbortHandle>,
    attachments: Vec<Upload>,
    view: TerminalView<W>,
}

impl NetworkDriver<Stdout> {
    /// Driver reading commands from stdin and printing to stdout.
    ///
    /// Must be called within a tokio runtime.
    pub fn stdio(api: ApiClient, tokens: TokenStore, visible_rows: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_lines(tx));
        let mut driver = Self::new(api, tokens, rx, TerminalView::new(io::stdout(), visible_rows));
        driver.requests.push(reader.abort_handle());
        driver
    }
}

impl<W: Write + Send> NetworkDriver<W> {
    /// Driver taking input lines from `lines` and rendering through `view`.
    pub fn new(
        api: ApiClient,
        tokens: TokenStore,
        lines: mpsc::UnboundedReceiver<String>,
        view: TerminalView<W>,
    ) -> Self {
        let (events, inputs) = mpsc::unbounded_channel();
        Self {
            api,
            tokens,
            events,
            inputs,
            lines,
            queued: VecDeque::new(),
            channels: HashMap::new(),
            fetches: HashMap::new(),
            requests: Vec::new(),
            attachments: Vec::new(),
            view,
        }
    }

    /// Rendering view.
    pub fn view(&self) -> &TerminalView<W> {
        &self.view
    }

    /// Files queued for the next message.
    pub fn pending_attachments(&self) -> &[Upload] {
        &self.attachments
    }

    /// History requests still running.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches.len()
    }

    /// Filter an input reported by a task.
    fn accept(&mut self, input: Input) -> Option<Input> {
        match &input {
            Input::App(AppEvent::HistoryLoaded { ticket, .. }) => {
                if self.fetches.remove(ticket).is_none() {
                    debug!(ticket = %ticket, "dropping result of cancelled fetch");
                    return None;
                }
            },
            Input::Channel(ChannelEvent::Closed { channel, .. }) => {
                self.channels.remove(channel);
            },
            _ => {},
        }
        Some(input)
    }

    /// Turn one input line into an input, printing feedback for local
    /// commands.
    async fn handle_line(&mut self, line: &str) -> Result<Option<Input>, DriverError> {
        let Some(command) = command::parse(line) else {
            return Ok(None);
        };

        let input = match command {
            Command::Login { email, password } => Input::App(AppEvent::Authenticate {
                mode: AuthMode::Login,
                credentials: Credentials::new(email, password),
            }),
            Command::Register { email, password } => Input::App(AppEvent::Authenticate {
                mode: AuthMode::Register,
                credentials: Credentials::new(email, password),
            }),
            Command::Logout => Input::App(AppEvent::Logout),
            Command::Batch(size) => Input::App(AppEvent::BatchSizeChanged(size)),
            Command::Older => Input::App(AppEvent::Scrolled(self.view.scroll_to_top())),
            Command::Bottom => Input::App(AppEvent::JumpToBottom),
            Command::Hide => Input::Visibility(false),
            Command::Show => Input::Visibility(true),
            Command::Quit => Input::App(AppEvent::Quit),
            Command::Message { body } => Input::App(AppEvent::Send {
                body,
                attachments: std::mem::take(&mut self.attachments),
            }),
            Command::Attach(path) => {
                self.attach(&path).await?;
                return Ok(None);
            },
            Command::Unknown { input } => {
                self.feedback(&format!("[error] Unknown command: {input}"))?;
                return Ok(None);
            },
            Command::InvalidArgs { command, error } => {
                self.feedback(&format!("[error] /{command}: {error}"))?;
                return Ok(None);
            },
        };
        Ok(Some(input))
    }

    async fn attach(&mut self, path: &Path) -> Result<(), DriverError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let filename = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                let line = format!("* attached {filename} ({} bytes)", bytes.len());
                self.attachments.push(Upload {
                    filename,
                    mime_type: command::mime_type_for(path).to_string(),
                    bytes,
                });
                self.feedback(&line)
            },
            Err(e) => self.feedback(&format!("[error] cannot read {}: {e}", path.display())),
        }
    }

    fn feedback(&mut self, line: &str) -> Result<(), DriverError> {
        self.view.print_line(line).map_err(DriverError::Terminal)
    }

    fn track_request(&mut self, handle: AbortHandle) {
        self.requests.retain(|request| !request.is_finished());
        self.requests.push(handle);
    }
}

impl<W: Write + Send> Driver for NetworkDriver<W> {
    type Error = DriverError;
    type Instant = Instant;

    async fn next_input(&mut self, deadline: Option<Instant>) -> Result<Option<Input>, Self::Error> {
        loop {
            if let Some(input) = self.queued.pop_front() {
                return Ok(Some(input));
            }

            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                input = self.inputs.recv() => {
                    // The driver holds a sender, so the queue never closes
                    if let Some(input) = input.and_then(|input| self.accept(input)) {
                        return Ok(Some(input));
                    }
                }

                line = self.lines.recv() => match line {
                    Some(line) => {
                        if let Some(input) = self.handle_line(&line).await? {
                            return Ok(Some(input));
                        }
                    },
                    None => return Ok(Some(Input::App(AppEvent::Quit))),
                },

                () = timer => return Ok(None),
            }
        }
    }

    fn channel(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Open { channel, token, device_id } => {
                let url = self.api.endpoints().live_channel(device_id.as_str(), &token);
                let live = LiveChannel::open(channel, url, self.events.clone());
                if let Some(previous) = self.channels.insert(channel, live) {
                    previous.abandon();
                }
            },
            ChannelCommand::Close { channel, code, reason } => {
                if let Some(live) = self.channels.remove(&channel) {
                    live.close(code, reason);
                }
            },
            ChannelCommand::Abandon { channel } => {
                if let Some(live) = self.channels.remove(&channel) {
                    live.abandon();
                }
            },
        }
    }

    fn fetch_history(&mut self, token: &str, request: FetchRequest) {
        let api = self.api.clone();
        let events = self.events.clone();
        let token = token.to_string();
        let ticket = request.ticket;

        let handle = tokio::spawn(async move {
            let result = api.history(&token, &request).await.map_err(|e| {
                warn!(ticket = %ticket, error = %e, "history fetch failed");
                e.user_message()
            });
            let _ = events.send(Input::App(AppEvent::HistoryLoaded { ticket, result }));
        });
        self.fetches.insert(ticket, handle.abort_handle());
    }

    fn cancel_fetch(&mut self, ticket: FetchTicket) {
        if let Some(handle) = self.fetches.remove(&ticket) {
            debug!(ticket = %ticket, "aborting history fetch");
            handle.abort();
        }
    }

    fn send_message(&mut self, token: &str, body: String, attachments: Vec<Upload>) {
        let api = self.api.clone();
        let events = self.events.clone();
        let token = token.to_string();

        let handle = tokio::spawn(async move {
            let result = api.send(&token, body, attachments).await.map_err(|e| {
                warn!(error = %e, "send failed");
                e.user_message()
            });
            let _ = events.send(Input::App(AppEvent::SendCompleted { result }));
        });
        self.track_request(handle.abort_handle());
    }

    fn authenticate(&mut self, mode: AuthMode, credentials: Credentials) {
        let api = self.api.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let result = api.authenticate(mode, &credentials).await.map_err(|e| e.user_message());
            let _ = events.send(Input::App(AppEvent::AuthCompleted { mode, result }));
        });
        self.track_request(handle.abort_handle());
    }

    fn persist_token(&mut self, token: Option<&str>) -> Result<(), Self::Error> {
        self.tokens.save(token).map_err(DriverError::TokenStore)
    }

    fn scroll(&mut self, command: ScrollCommand) {
        let geometry = self.view.scroll(command);
        self.queued.push_back(Input::App(AppEvent::Scrolled(geometry)));
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App<Instant>) -> Result<(), Self::Error> {
        if let Some(scroll_height) = self.view.render(app).map_err(DriverError::Terminal)? {
            self.queued.push_back(Input::App(AppEvent::LayoutChanged { scroll_height }));
        }
        Ok(())
    }

    fn stop(&mut self) {
        for (_, live) in self.channels.drain() {
            live.abandon();
        }
        for (_, handle) in self.fetches.drain() {
            handle.abort();
        }
        for handle in self.requests.drain(..) {
            handle.abort();
        }
    }
}

async fn read_lines(tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                return;
            },
        }
    }
}
