//! WebSocket transport for the live channel.
//!
//! Each [`ChannelId`] gets its own task owning one socket. The task reports
//! what happens as [`ChannelEvent`]s tagged with its id and never decides
//! anything itself: reconnect policy stays in the Sans-IO
//! [`notifi_core::Connection`].

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use notifi_app::{ChannelEvent, Input};
use notifi_core::ChannelId;
use notifi_proto::CloseCode;
use tokio::{sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message as WsMessage,
        protocol::{CloseFrame, frame::coding::CloseCode as WsCloseCode},
    },
};
use tracing::{debug, trace};
use url::Url;

/// Close code reported when the peer closes without a status.
const NO_STATUS: CloseCode = CloseCode::new(1005);

/// How long a closing channel waits for the peer's close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Control {
    Close { code: CloseCode, reason: String },
}

/// Handle to one live-channel task.
#[derive(Debug)]
pub struct LiveChannel {
    channel: ChannelId,
    control: mpsc::UnboundedSender<Control>,
    abort_handle: AbortHandle,
}

impl LiveChannel {
    /// Connect to `url` in a new task, reporting into `events`.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(channel: ChannelId, url: Url, events: mpsc::UnboundedSender<Input>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_channel(channel, url, control_rx, events));
        Self { channel, control: control_tx, abort_handle: handle.abort_handle() }
    }

    /// Channel this task serves.
    pub fn id(&self) -> ChannelId {
        self.channel
    }

    /// Send a close frame and end the task.
    pub fn close(&self, code: CloseCode, reason: String) {
        if self.control.send(Control::Close { code, reason }).is_err() {
            trace!(channel = %self.channel, "close on finished channel");
        }
    }

    /// Drop the socket without a close handshake.
    pub fn abandon(&self) {
        self.abort_handle.abort();
    }

    /// Whether the task has ended, including a finished close handshake.
    pub fn is_finished(&self) -> bool {
        self.abort_handle.is_finished()
    }
}

async fn run_channel(
    channel: ChannelId,
    url: Url,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<Input>,
) {
    let report = |event: ChannelEvent| {
        // Receiver gone means the driver stopped
        let _ = events.send(Input::Channel(event));
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            report(ChannelEvent::Failed { channel, reason: e.to_string() });
            return;
        },
    };
    report(ChannelEvent::Opened { channel });

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            command = control.recv() => {
                let Some(Control::Close { code, reason }) = command else {
                    return;
                };
                let frame = CloseFrame { code: WsCloseCode::from(code.as_u16()), reason: reason.into() };
                if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                    debug!(channel = %channel, error = %e, "close frame not sent");
                    return;
                }
                let answered = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, await_peer_close(&mut source)).await;
                if answered.is_err() {
                    debug!(channel = %channel, "peer did not answer close");
                }
                return;
            }

            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    report(ChannelEvent::Text { channel, text: text.as_str().to_string() });
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map_or(NO_STATUS, |frame| CloseCode::new(u16::from(frame.code)));
                    report(ChannelEvent::Closed { channel, code });
                    return;
                },
                Some(Ok(other)) => trace!(channel = %channel, ?other, "ignoring frame"),
                Some(Err(e)) => {
                    report(ChannelEvent::Failed { channel, reason: e.to_string() });
                    report(ChannelEvent::Closed { channel, code: CloseCode::ABNORMAL });
                    return;
                },
                None => {
                    report(ChannelEvent::Closed { channel, code: CloseCode::ABNORMAL });
                    return;
                },
            }
        }
    }
}

/// Read until the peer's close frame or the end of the stream.
///
/// Frames after our close are not reported.
async fn await_peer_close<S, E>(source: &mut S)
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
{
    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Close(_)) | Err(_) => return,
            Ok(other) => trace!(?other, "dropping frame while closing"),
        }
    }
}
