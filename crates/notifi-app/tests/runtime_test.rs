//! Runtime orchestration tests with a scripted driver.
//!
//! The driver replays a fixed sequence of inputs and records every request
//! the runtime makes, so the wiring between App, Bridge and Driver can be
//! checked end to end without I/O.

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    time::{Duration, Instant},
};

use notifi_app::{
    App, AppConfig, AppEvent, AuthMode, ChannelCommand, ChannelEvent, Driver, Input, Runtime,
    Upload,
};
use notifi_core::{
    ChannelId, ConnectionConfig, Environment, FetchRequest, FetchTicket, HostInfo, Identity,
    MemorySessionStore, ScrollCommand,
};
use notifi_proto::{AuthResponse, CloseCode, Credentials};

const MESSAGE: &str = r#"{"id":500,"body":"hello","timestamp":"2024-05-01T10:00:00Z","user_id":7,"user_email":"a@example.com","attachments":[]}"#;

#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(9);
    }

    fn wall_clock_millis(&self) -> u64 {
        0
    }
}

#[derive(Debug)]
struct ScriptError(String);

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptError: {}", self.0)
    }
}

impl std::error::Error for ScriptError {}

enum Step {
    Input(Input),
    /// Let the clock run to the runtime's deadline.
    Wait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Channel(ChannelCommand),
    Fetch(FetchRequest),
    Cancel(FetchTicket),
    Send(String),
    Auth(AuthMode),
    Scroll(ScrollCommand),
    Stop,
}

struct ScriptedDriver {
    steps: VecDeque<Step>,
    calls: Vec<Call>,
    stored_token: Option<String>,
    renders: usize,
    now: Instant,
}

impl ScriptedDriver {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            calls: Vec::new(),
            stored_token: None,
            renders: 0,
            now: Instant::now(),
        }
    }

    fn opened_channels(&self) -> Vec<ChannelId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Channel(ChannelCommand::Open { channel, .. }) => Some(*channel),
                _ => None,
            })
            .collect()
    }
}

impl Driver for ScriptedDriver {
    type Error = ScriptError;
    type Instant = Instant;

    async fn next_input(&mut self, deadline: Option<Instant>) -> Result<Option<Input>, ScriptError> {
        match self.steps.pop_front() {
            Some(Step::Input(input)) => Ok(Some(input)),
            Some(Step::Wait) => {
                if let Some(deadline) = deadline {
                    self.now = self.now.max(deadline);
                }
                Ok(None)
            },
            None => Err(ScriptError("script exhausted".to_string())),
        }
    }

    fn channel(&mut self, command: ChannelCommand) {
        self.calls.push(Call::Channel(command));
    }

    fn fetch_history(&mut self, _token: &str, request: FetchRequest) {
        self.calls.push(Call::Fetch(request));
    }

    fn cancel_fetch(&mut self, ticket: FetchTicket) {
        self.calls.push(Call::Cancel(ticket));
    }

    fn send_message(&mut self, _token: &str, body: String, _attachments: Vec<Upload>) {
        self.calls.push(Call::Send(body));
    }

    fn authenticate(&mut self, mode: AuthMode, _credentials: Credentials) {
        self.calls.push(Call::Auth(mode));
    }

    fn persist_token(&mut self, token: Option<&str>) -> Result<(), ScriptError> {
        self.stored_token = token.map(str::to_string);
        Ok(())
    }

    fn scroll(&mut self, command: ScrollCommand) {
        self.calls.push(Call::Scroll(command));
    }

    fn now(&self) -> Instant {
        self.now
    }

    fn render(&mut self, _app: &App<Instant>) -> Result<(), ScriptError> {
        self.renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop);
    }
}

fn runtime(steps: Vec<Step>) -> Runtime<ScriptedDriver, TestEnv> {
    let identity =
        Identity::create(&TestEnv, &HostInfo::new("Linux", "test"), &mut MemorySessionStore::new());
    Runtime::new(
        ScriptedDriver::new(steps),
        TestEnv,
        identity,
        ConnectionConfig::default(),
        AppConfig::default(),
    )
}

fn channel_event(event: ChannelEvent) -> Step {
    Step::Input(Input::Channel(event))
}

fn app_event(event: AppEvent) -> Step {
    Step::Input(Input::App(event))
}

#[tokio::test]
async fn restored_session_loads_history_and_receives_live_messages() {
    let first = ChannelId::new(1);
    let mut runtime = runtime(vec![
        channel_event(ChannelEvent::Opened { channel: first }),
        channel_event(ChannelEvent::Text { channel: first, text: MESSAGE.to_string() }),
        app_event(AppEvent::Quit),
    ]);

    runtime.run(Some("tok".to_string())).await.unwrap();

    let calls = &runtime.driver().calls;
    assert!(matches!(&calls[0], Call::Fetch(FetchRequest { limit: 20, before: None, .. })));
    assert!(matches!(&calls[1], Call::Channel(ChannelCommand::Open { channel, token, .. })
        if *channel == first && token == "tok"));
    assert!(matches!(&calls[calls.len() - 2], Call::Channel(ChannelCommand::Close {
        code: CloseCode::NORMAL,
        ..
    })));
    assert_eq!(calls.last(), Some(&Call::Stop));

    assert_eq!(runtime.app().timeline().messages()[0].id, 500);
    assert!(!runtime.bridge().is_connected());
    assert!(runtime.driver().renders > 1);
}

#[tokio::test]
async fn login_persists_token_and_connects() {
    let mut runtime = runtime(vec![
        app_event(AppEvent::Authenticate {
            mode: AuthMode::Login,
            credentials: Credentials::new("a@example.com", "secret"),
        }),
        app_event(AppEvent::AuthCompleted {
            mode: AuthMode::Login,
            result: Ok(AuthResponse { token: "tok".to_string(), user_id: 7 }),
        }),
        app_event(AppEvent::Quit),
    ]);

    runtime.run(None).await.unwrap();

    let driver = runtime.driver();
    assert_eq!(driver.calls[0], Call::Auth(AuthMode::Login));
    assert_eq!(driver.stored_token.as_deref(), Some("tok"));
    assert_eq!(driver.opened_channels(), vec![ChannelId::new(1)]);
    assert_eq!(runtime.app().auth().user_id(), Some(7));
}

#[tokio::test]
async fn abnormal_close_reconnects_after_delay() {
    let first = ChannelId::new(1);
    let second = ChannelId::new(2);
    let mut runtime = runtime(vec![
        channel_event(ChannelEvent::Opened { channel: first }),
        channel_event(ChannelEvent::Closed { channel: first, code: CloseCode::ABNORMAL }),
        Step::Wait,
        channel_event(ChannelEvent::Opened { channel: second }),
        app_event(AppEvent::Quit),
    ]);

    assert!(!runtime.start(Some("tok".to_string())).unwrap());
    assert!(!runtime.step().await.unwrap());
    assert!(runtime.app().connection_status().connected);

    assert!(!runtime.step().await.unwrap());
    assert!(!runtime.app().connection_status().connected);
    assert_eq!(runtime.driver().opened_channels(), vec![first]);

    assert!(!runtime.step().await.unwrap());
    assert_eq!(runtime.driver().opened_channels(), vec![first, second]);

    assert!(!runtime.step().await.unwrap());
    assert!(runtime.app().connection_status().connected);

    assert!(runtime.step().await.unwrap());
    runtime.shutdown();
    assert!(!runtime.app().connection_status().connected);
    assert!(!runtime.bridge().is_connected());
}

#[tokio::test]
async fn logout_disconnects_and_forgets_token() {
    let first = ChannelId::new(1);
    let mut runtime = runtime(vec![
        channel_event(ChannelEvent::Opened { channel: first }),
        app_event(AppEvent::Logout),
        app_event(AppEvent::Quit),
    ]);
    runtime.driver_mut().stored_token = Some("tok".to_string());

    runtime.run(Some("tok".to_string())).await.unwrap();

    let driver = runtime.driver();
    assert_eq!(driver.stored_token, None);
    assert!(driver.calls.iter().any(|c| matches!(c, Call::Cancel(_))));
    assert!(driver.calls.iter().any(|c| matches!(c, Call::Channel(ChannelCommand::Close {
        channel,
        code: CloseCode::NORMAL,
        ..
    }) if *channel == first)));
    assert!(!runtime.app().is_logged_in());
    assert!(!runtime.app().connection_status().connected);
}
