//! Line-oriented rendering and a virtual viewport.
//!
//! The terminal is append-only, so [`TerminalView`] prints what changed since
//! the last render instead of redrawing: new messages at the tail, earlier
//! history when a backward page lands, notices and connection status. It
//! also keeps the pixel geometry the scroll coordinator works with, treating
//! every message as one fixed-height row.

use std::io::{self, Write};

use notifi_app::{App, NoticeKind};
use notifi_core::{MonotonicInstant, ScrollCommand, ViewportGeometry};
use notifi_proto::{Message, MessageId};

/// Height of one message row in viewport pixels.
pub const ROW_HEIGHT: u32 = 24;

/// Rows visible at once.
pub const DEFAULT_VISIBLE_ROWS: u32 = 20;

/// Renders App state to a writer.
#[derive(Debug)]
pub struct TerminalView<W> {
    out: W,
    visible_rows: u32,
    scroll_top: u32,
    scroll_height: u32,
    oldest: Option<MessageId>,
    newest: Option<MessageId>,
    notice: Option<String>,
    status: Option<String>,
    unread: u32,
}

impl<W: Write> TerminalView<W> {
    /// View writing to `out`.
    pub fn new(out: W, visible_rows: u32) -> Self {
        Self {
            out,
            visible_rows: visible_rows.max(1),
            scroll_top: 0,
            scroll_height: 0,
            oldest: None,
            newest: None,
            notice: None,
            status: None,
            unread: 0,
        }
    }

    /// Current scroll geometry.
    pub fn geometry(&self) -> ViewportGeometry {
        ViewportGeometry::new(self.scroll_top, self.scroll_height, self.client_height())
    }

    /// Writer the view prints to.
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Print what changed since the last render.
    ///
    /// Returns the new content height if it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn render<I: MonotonicInstant>(&mut self, app: &App<I>) -> io::Result<Option<u32>> {
        let status = app.connection_status().to_string();
        if self.status.as_deref() != Some(status.as_str()) {
            writeln!(self.out, "* {status}")?;
            self.status = Some(status);
        }

        let timeline = app.timeline();
        if timeline.is_empty() {
            self.oldest = None;
            self.newest = None;
        } else {
            self.print_earlier(app)?;
            self.print_newer(app)?;
        }

        let unread = app.read_state().unread_count;
        if unread > self.unread {
            writeln!(self.out, "* {unread} unread, /bottom to jump")?;
        }
        self.unread = unread;

        let notice = app.notice().map(|n| (n.kind, n.message.clone()));
        let text = notice.as_ref().map(|(_, message)| message.clone());
        if text != self.notice {
            if let Some((kind, message)) = notice {
                writeln!(self.out, "{} {message}", notice_prefix(kind))?;
            }
            self.notice = text;
        }
        self.out.flush()?;

        let height = timeline.len() as u32 * ROW_HEIGHT;
        if height == self.scroll_height {
            return Ok(None);
        }
        self.scroll_height = height;
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
        Ok(Some(height))
    }

    /// Print one line of local feedback.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn print_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    /// Apply a scroll command. Returns the geometry afterwards.
    pub fn scroll(&mut self, command: ScrollCommand) -> ViewportGeometry {
        self.scroll_top = match command {
            ScrollCommand::ToBottom(_) => self.max_scroll_top(),
            ScrollCommand::To { top } => top.min(self.max_scroll_top()),
        };
        self.geometry()
    }

    /// Scroll to the very top. Returns the geometry afterwards.
    pub fn scroll_to_top(&mut self) -> ViewportGeometry {
        self.scroll(ScrollCommand::To { top: 0 })
    }

    fn client_height(&self) -> u32 {
        self.visible_rows * ROW_HEIGHT
    }

    fn max_scroll_top(&self) -> u32 {
        self.scroll_height.saturating_sub(self.client_height())
    }

    fn print_earlier<I: MonotonicInstant>(&mut self, app: &App<I>) -> io::Result<()> {
        let Some(oldest) = self.oldest else {
            return Ok(());
        };
        let earlier: Vec<_> = app.entries().take_while(|e| e.message.id < oldest).collect();
        if earlier.is_empty() {
            return Ok(());
        }

        writeln!(self.out, "-- {} earlier messages --", earlier.len())?;
        for entry in &earlier {
            print_message(&mut self.out, entry.message, entry.starts_new_day, entry.is_own)?;
        }
        writeln!(self.out, "-- end of earlier messages --")?;
        self.oldest = earlier.first().map(|e| e.message.id);
        Ok(())
    }

    fn print_newer<I: MonotonicInstant>(&mut self, app: &App<I>) -> io::Result<()> {
        for entry in app.entries() {
            if self.newest.is_some_and(|newest| entry.message.id <= newest) {
                continue;
            }
            print_message(&mut self.out, entry.message, entry.starts_new_day, entry.is_own)?;
            self.newest = Some(entry.message.id);
            if self.oldest.is_none() {
                self.oldest = Some(entry.message.id);
            }
        }
        Ok(())
    }
}

fn notice_prefix(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Default => "*",
        NoticeKind::Info => "[info]",
        NoticeKind::Success => "[ok]",
        NoticeKind::Error => "[error]",
    }
}

fn print_message(
    out: &mut impl Write,
    message: &Message,
    starts_new_day: bool,
    is_own: bool,
) -> io::Result<()> {
    let sent_at = message.sent_at();
    if starts_new_day && let Some(sent_at) = sent_at {
        writeln!(out, "== {} ==", sent_at.format("%A, %B %-d, %Y"))?;
    }

    let time = sent_at.map_or_else(|| "--:--".to_string(), |t| t.format("%H:%M").to_string());
    let author = if is_own { "you" } else { message.author_email.as_str() };
    writeln!(out, "[{time}] {author}: {}", message.body)?;
    for attachment in &message.attachments {
        writeln!(out, "    + {} ({})", attachment.filename, attachment.url)?;
    }
    Ok(())
}
