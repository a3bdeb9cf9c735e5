//! Message stream reconciliation.
//!
//! Merges two independent inputs into one ordered timeline:
//!
//! - live messages pushed one at a time over the channel, appended at the tail
//! - history pages pulled over REST: an initial page that replaces the
//!   timeline, and backward pages that are prepended
//!
//! At most one history fetch is in flight. Each fetch is identified by a
//! [`FetchTicket`]; a result is applied only if its ticket is still the
//! in-flight one, so a response that arrives after logout, a newer initial
//! fetch or a timeout is discarded.
//!
//! # Invariants
//!
//! - No two messages share an id
//! - Backward pages never reorder messages already in the timeline
//! - `unread_count == 0` whenever `is_near_bottom`

use std::{collections::HashSet, fmt};

use notifi_proto::{Message, MessageId, MessagePage};
use tracing::{debug, info, warn};

use crate::error::TimelineError;

/// Default number of messages per history fetch.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Timeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineConfig {
    /// `limit` of each history fetch
    pub page_size: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE }
    }
}

/// Which end of the history a fetch loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// Newest page, replaces the timeline
    Initial,
    /// Page older than the cursor, prepended
    Backward,
}

/// Identifies one history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    id: u64,
    kind: FetchKind,
}

impl FetchTicket {
    /// Fetch kind.
    pub fn kind(self) -> FetchKind {
        self.kind
    }

    /// Sequence number, unique per timeline.
    pub fn id(self) -> u64 {
        self.id
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.id, self.kind)
    }
}

/// History request the driver should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Ticket to report the result under
    pub ticket: FetchTicket,
    /// `limit` query parameter
    pub limit: u32,
    /// `before` query parameter; `None` for the newest page
    pub before: Option<String>,
}

/// Read/unread bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    /// Timestamp of the newest message the user has seen
    pub last_read_timestamp: Option<String>,
    /// Messages appended since the user scrolled away from the bottom
    pub unread_count: u32,
    /// Viewport is within the near-bottom threshold
    pub is_near_bottom: bool,
}

impl Default for ReadState {
    fn default() -> Self {
        Self { last_read_timestamp: None, unread_count: 0, is_near_bottom: true }
    }
}

/// Result of applying a live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Appended at the tail
    Appended,
    /// Appended at the tail although its id is not above the previous tail
    AppendedOutOfOrder,
    /// Already present, dropped
    Duplicate,
}

/// Result of applying a history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Initial page replaced the timeline
    Replaced {
        /// Messages now in the timeline
        total: usize,
    },
    /// Backward page prepended
    Prepended {
        /// Messages added at the front
        added: usize,
        /// Overlapping messages dropped
        dropped: usize,
    },
}

/// Ordered, de-duplicated message timeline with read state.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    config: TimelineConfig,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    read: ReadState,
    has_more: bool,
    next_cursor: Option<String>,
    in_flight: Option<FetchTicket>,
    /// Timeline length when the in-flight initial fetch was issued
    initial_mark: usize,
    next_ticket: u64,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new(config: TimelineConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// No messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest message.
    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Read/unread state.
    pub fn read_state(&self) -> &ReadState {
        &self.read
    }

    /// Server reported older history.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Cursor for the next backward fetch.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    /// Ticket of the in-flight fetch.
    pub fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    /// A history fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Messages per history fetch.
    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    /// Change the `limit` of subsequent fetches.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.config.page_size = page_size.max(1);
    }

    /// Whether the message at `index` starts a new UTC calendar day.
    ///
    /// The first message always does, as does any message whose timestamp
    /// (or whose predecessor's) cannot be parsed.
    pub fn starts_new_day(&self, index: usize) -> bool {
        let Some(current) = self.messages.get(index) else {
            return false;
        };
        let Some(previous) = index.checked_sub(1).and_then(|i| self.messages.get(i)) else {
            return true;
        };
        match (previous.sent_at(), current.sent_at()) {
            (Some(a), Some(b)) => a.date_naive() != b.date_naive(),
            _ => true,
        }
    }

    /// Start a fetch of the newest page.
    ///
    /// Always issued: an initial fetch supersedes any fetch in flight, whose
    /// result will be discarded.
    pub fn begin_initial_fetch(&mut self) -> FetchRequest {
        if let Some(previous) = self.in_flight {
            debug!(ticket = %previous, "superseding in-flight fetch");
        }
        let ticket = self.issue(FetchKind::Initial);
        self.initial_mark = self.messages.len();
        FetchRequest { ticket, limit: self.config.page_size, before: None }
    }

    /// Start a fetch of the page before the oldest message.
    ///
    /// `None` while another fetch is in flight, when the server reported no
    /// more history, or when there is no cursor.
    pub fn begin_backward_fetch(&mut self) -> Option<FetchRequest> {
        if self.in_flight.is_some() || !self.has_more {
            return None;
        }
        let cursor = self.next_cursor.clone()?;
        let ticket = self.issue(FetchKind::Backward);
        Some(FetchRequest { ticket, limit: self.config.page_size, before: Some(cursor) })
    }

    /// Apply a fetched page.
    ///
    /// # Errors
    ///
    /// - `TimelineError::StaleFetch` if `ticket` is not the in-flight fetch;
    ///   the page is discarded
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        page: MessagePage,
    ) -> Result<PageOutcome, TimelineError> {
        self.settle(ticket)?;

        let outcome = match ticket.kind {
            FetchKind::Initial => self.replace(page),
            FetchKind::Backward => self.prepend(page),
        };
        debug!(ticket = %ticket, outcome = ?outcome, "history page applied");
        Ok(outcome)
    }

    /// Record that a fetch failed or timed out. Nothing is applied.
    ///
    /// # Errors
    ///
    /// - `TimelineError::StaleFetch` if `ticket` is not the in-flight fetch
    pub fn fail_fetch(&mut self, ticket: FetchTicket) -> Result<(), TimelineError> {
        self.settle(ticket)
    }

    /// Drop the in-flight fetch, if any, returning its ticket.
    pub fn cancel_fetch(&mut self) -> Option<FetchTicket> {
        self.in_flight.take()
    }

    /// Append a live message.
    ///
    /// Duplicates (at-least-once delivery across reconnects) are dropped. An
    /// id not above the tail is logged and still appended at the tail.
    pub fn apply_live(&mut self, message: Message) -> LiveOutcome {
        if self.ids.contains(&message.id) {
            debug!(id = message.id, "duplicate live message dropped");
            return LiveOutcome::Duplicate;
        }

        let outcome = match self.messages.last() {
            Some(tail) if message.id <= tail.id => {
                warn!(id = message.id, tail = tail.id, "live message out of order");
                LiveOutcome::AppendedOutOfOrder
            },
            _ => LiveOutcome::Appended,
        };

        if self.read.is_near_bottom {
            self.read.last_read_timestamp = Some(message.timestamp.clone());
        } else {
            self.read.unread_count = self.read.unread_count.saturating_add(1);
        }

        self.ids.insert(message.id);
        self.messages.push(message);
        outcome
    }

    /// Mark everything read: unread drops to zero and the read marker moves
    /// to the tail.
    pub fn mark_read(&mut self) {
        self.read.unread_count = 0;
        if let Some(tail) = self.messages.last() {
            self.read.last_read_timestamp = Some(tail.timestamp.clone());
        }
    }

    /// Update the near-bottom flag. Reaching the bottom marks everything read.
    pub fn set_near_bottom(&mut self, near_bottom: bool) {
        self.read.is_near_bottom = near_bottom;
        if near_bottom {
            self.mark_read();
        }
    }

    /// Forget everything, including any in-flight fetch.
    pub fn clear(&mut self) {
        let config = self.config;
        let next_ticket = self.next_ticket;
        *self = Self { config, next_ticket, ..Self::default() };
    }

    fn issue(&mut self, kind: FetchKind) -> FetchTicket {
        self.next_ticket += 1;
        let ticket = FetchTicket { id: self.next_ticket, kind };
        self.in_flight = Some(ticket);
        ticket
    }

    fn settle(&mut self, ticket: FetchTicket) -> Result<(), TimelineError> {
        if self.in_flight != Some(ticket) {
            return Err(TimelineError::StaleFetch { ticket });
        }
        self.in_flight = None;
        Ok(())
    }

    fn replace(&mut self, page: MessagePage) -> PageOutcome {
        let newest_in_page = page.newest().map(|m| m.id);

        // Live messages that arrived while this fetch was in flight.
        let mark = self.initial_mark.min(self.messages.len());
        let arrived: Vec<Message> = self
            .messages
            .drain(mark..)
            .filter(|m| newest_in_page.is_none_or(|newest| m.id > newest))
            .collect();

        self.has_more = page.has_more;
        self.next_cursor = page.next_cursor;

        self.messages.clear();
        self.ids.clear();
        for message in page.messages.into_iter().chain(arrived) {
            if self.ids.insert(message.id) {
                self.messages.push(message);
            }
        }

        self.read.last_read_timestamp = self.messages.last().map(|m| m.timestamp.clone());
        self.read.unread_count = 0;

        info!(total = self.messages.len(), has_more = self.has_more, "timeline loaded");
        PageOutcome::Replaced { total: self.messages.len() }
    }

    fn prepend(&mut self, page: MessagePage) -> PageOutcome {
        let oldest = self.messages.first().map(|m| m.id);
        let total = page.messages.len();

        let mut older = Vec::with_capacity(total);
        for message in page.messages {
            let overlaps = oldest.is_some_and(|oldest| message.id >= oldest);
            if !overlaps && self.ids.insert(message.id) {
                older.push(message);
            }
        }

        let added = older.len();
        let dropped = total - added;
        if dropped > 0 {
            warn!(dropped, "backward page overlaps the timeline");
        }

        self.messages.splice(0..0, older);
        self.has_more = page.has_more;
        self.next_cursor = page.next_cursor;

        PageOutcome::Prepended { added, dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64) -> Message {
        Message {
            id,
            body: format!("m{id}"),
            timestamp: format!("2024-05-01T10:{:02}:00Z", id % 60),
            author_user_id: 1,
            author_email: "a@example.com".to_string(),
            attachments: Vec::new(),
        }
    }

    fn page(ids: std::ops::RangeInclusive<u64>, has_more: bool) -> MessagePage {
        let messages: Vec<Message> = ids.map(message).collect();
        let next_cursor = if has_more { messages.first().map(|m| m.id.to_string()) } else { None };
        MessagePage { messages, has_more, next_cursor }
    }

    fn ids(timeline: &Timeline) -> Vec<u64> {
        timeline.messages().iter().map(|m| m.id).collect()
    }

    fn loaded(first: std::ops::RangeInclusive<u64>, has_more: bool) -> Timeline {
        let mut timeline = Timeline::new(TimelineConfig::default());
        let request = timeline.begin_initial_fetch();
        timeline.complete_fetch(request.ticket, page(first, has_more)).unwrap();
        timeline
    }

    #[test]
    fn initial_fetch_requests_newest_page() {
        let mut timeline = Timeline::new(TimelineConfig { page_size: 50 });
        let request = timeline.begin_initial_fetch();
        assert_eq!(request.limit, 50);
        assert_eq!(request.before, None);
        assert_eq!(request.ticket.kind(), FetchKind::Initial);
        assert!(timeline.is_fetching());
    }

    #[test]
    fn initial_fetch_replaces_and_sets_read_marker() {
        let timeline = loaded(6..=10, true);

        assert_eq!(ids(&timeline), vec![6, 7, 8, 9, 10]);
        assert_eq!(
            timeline.read_state().last_read_timestamp.as_deref(),
            Some(message(10).timestamp.as_str())
        );
        assert!(timeline.has_more());
        assert_eq!(timeline.next_cursor(), Some("6"));
        assert!(!timeline.is_fetching());
    }

    #[test]
    fn backward_fetch_prepends_in_order() {
        let mut timeline = loaded(6..=10, true);

        let request = timeline.begin_backward_fetch().unwrap();
        assert_eq!(request.before.as_deref(), Some("6"));

        let outcome = timeline.complete_fetch(request.ticket, page(1..=5, false)).unwrap();

        assert_eq!(outcome, PageOutcome::Prepended { added: 5, dropped: 0 });
        assert_eq!(ids(&timeline), (1..=10).collect::<Vec<_>>());
        assert!(!timeline.has_more());
        assert!(timeline.begin_backward_fetch().is_none(), "no more history");
    }

    #[test]
    fn backward_fetch_is_mutually_exclusive() {
        let mut timeline = loaded(6..=10, true);

        let first = timeline.begin_backward_fetch().unwrap();
        let snapshot = timeline.clone();
        assert!(timeline.begin_backward_fetch().is_none());
        assert_eq!(timeline.in_flight(), snapshot.in_flight());
        assert_eq!(ids(&timeline), ids(&snapshot));

        timeline.complete_fetch(first.ticket, page(1..=5, true)).unwrap();
        assert!(timeline.begin_backward_fetch().is_some());
    }

    #[test]
    fn backward_fetch_needs_cursor() {
        let mut timeline = Timeline::new(TimelineConfig::default());
        let request = timeline.begin_initial_fetch();
        let page = MessagePage { messages: vec![message(1)], has_more: true, next_cursor: None };
        timeline.complete_fetch(request.ticket, page).unwrap();

        assert!(timeline.begin_backward_fetch().is_none());
    }

    #[test]
    fn overlapping_backward_page_is_deduplicated() {
        let mut timeline = loaded(6..=10, true);
        let request = timeline.begin_backward_fetch().unwrap();

        let outcome = timeline.complete_fetch(request.ticket, page(3..=7, true)).unwrap();

        assert_eq!(outcome, PageOutcome::Prepended { added: 3, dropped: 2 });
        assert_eq!(ids(&timeline), vec![3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut timeline = loaded(6..=10, true);
        let backward = timeline.begin_backward_fetch().unwrap();
        let initial = timeline.begin_initial_fetch();

        let err = timeline.complete_fetch(backward.ticket, page(1..=5, false)).unwrap_err();
        assert_eq!(err, TimelineError::StaleFetch { ticket: backward.ticket });
        assert_eq!(ids(&timeline), vec![6, 7, 8, 9, 10]);

        timeline.complete_fetch(initial.ticket, page(7..=11, true)).unwrap();
        assert_eq!(ids(&timeline), vec![7, 8, 9, 10, 11]);
    }

    #[test]
    fn failed_fetch_releases_slot() {
        let mut timeline = loaded(6..=10, true);
        let request = timeline.begin_backward_fetch().unwrap();

        timeline.fail_fetch(request.ticket).unwrap();
        assert!(!timeline.is_fetching());
        assert!(timeline.fail_fetch(request.ticket).is_err());
        assert!(timeline.begin_backward_fetch().is_some());
    }

    #[test]
    fn live_message_near_bottom_moves_read_marker() {
        let mut timeline = loaded(1..=3, false);

        assert_eq!(timeline.apply_live(message(4)), LiveOutcome::Appended);

        assert_eq!(timeline.read_state().unread_count, 0);
        assert_eq!(
            timeline.read_state().last_read_timestamp.as_deref(),
            Some(message(4).timestamp.as_str())
        );
    }

    #[test]
    fn unread_accounting() {
        let mut timeline = loaded(1..=3, false);
        let marker = timeline.read_state().last_read_timestamp.clone();

        timeline.set_near_bottom(false);
        for id in 4..=6 {
            timeline.apply_live(message(id));
        }
        assert_eq!(timeline.read_state().unread_count, 3);
        assert_eq!(timeline.read_state().last_read_timestamp, marker);

        timeline.mark_read();
        assert_eq!(timeline.read_state().unread_count, 0);
        assert_eq!(
            timeline.read_state().last_read_timestamp.as_deref(),
            Some(message(6).timestamp.as_str())
        );
    }

    #[test]
    fn reaching_bottom_marks_read() {
        let mut timeline = loaded(1..=3, false);
        timeline.set_near_bottom(false);
        timeline.apply_live(message(4));

        timeline.set_near_bottom(true);
        assert_eq!(timeline.read_state().unread_count, 0);
    }

    #[test]
    fn duplicate_live_message_dropped() {
        let mut timeline = loaded(1..=3, false);
        timeline.set_near_bottom(false);

        assert_eq!(timeline.apply_live(message(3)), LiveOutcome::Duplicate);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.read_state().unread_count, 0);
    }

    #[test]
    fn out_of_order_live_message_still_appended() {
        let mut timeline = loaded(1..=2, false);
        timeline.apply_live(message(10));

        assert_eq!(timeline.apply_live(message(5)), LiveOutcome::AppendedOutOfOrder);
        assert_eq!(ids(&timeline), vec![1, 2, 10, 5]);
    }

    #[test]
    fn empty_history_then_live() {
        let mut timeline = Timeline::new(TimelineConfig::default());
        let request = timeline.begin_initial_fetch();
        let outcome = timeline.complete_fetch(request.ticket, MessagePage::empty()).unwrap();

        assert_eq!(outcome, PageOutcome::Replaced { total: 0 });
        assert!(timeline.is_empty());
        assert_eq!(timeline.read_state().last_read_timestamp, None);

        timeline.apply_live(message(1));
        assert_eq!(ids(&timeline), vec![1]);
    }

    #[test]
    fn live_messages_during_initial_fetch_are_kept() {
        let mut timeline = Timeline::new(TimelineConfig::default());
        let request = timeline.begin_initial_fetch();

        timeline.apply_live(message(5));
        timeline.apply_live(message(6));

        timeline.complete_fetch(request.ticket, page(1..=5, false)).unwrap();
        assert_eq!(ids(&timeline), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(timeline.read_state().unread_count, 0);
        assert_eq!(
            timeline.read_state().last_read_timestamp.as_deref(),
            Some(message(6).timestamp.as_str())
        );
    }

    #[test]
    fn refetch_drops_previous_content() {
        let mut timeline = loaded(1..=5, false);
        let request = timeline.begin_initial_fetch();
        timeline.complete_fetch(request.ticket, MessagePage::empty()).unwrap();
        assert!(timeline.is_empty());
    }

    #[test]
    fn clear_discards_in_flight_fetch() {
        let mut timeline = loaded(1..=5, true);
        let request = timeline.begin_backward_fetch().unwrap();

        timeline.clear();

        assert!(timeline.is_empty());
        assert!(timeline.complete_fetch(request.ticket, page(1..=2, false)).is_err());
        assert!(timeline.read_state().is_near_bottom);
    }

    #[test]
    fn day_boundaries() {
        let mut timeline = Timeline::new(TimelineConfig::default());
        let request = timeline.begin_initial_fetch();
        let mut messages = vec![message(1), message(2), message(3)];
        messages[2].timestamp = "2024-05-02T00:00:01Z".to_string();
        timeline
            .complete_fetch(request.ticket, MessagePage { messages, has_more: false, next_cursor: None })
            .unwrap();

        assert!(timeline.starts_new_day(0));
        assert!(!timeline.starts_new_day(1));
        assert!(timeline.starts_new_day(2));
        assert!(!timeline.starts_new_day(3));
    }
}
