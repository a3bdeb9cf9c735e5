//! Property-based tests for timeline reconciliation.
//!
//! A simulated server holds messages `1..=total`. The timeline loads the
//! newest page, then receives an arbitrary interleaving of live messages
//! (including redeliveries), backward fetches, viewport changes and stale
//! results. The timeline must stay ordered, duplicate-free and consistent with
//! its read state.

use std::collections::HashSet;

use notifi_core::{FetchKind, LiveOutcome, Timeline, TimelineConfig};
use notifi_proto::{Message, MessagePage};
use proptest::prelude::*;

fn message(id: u64) -> Message {
    Message {
        id,
        body: format!("m{id}"),
        timestamp: format!("2024-05-01T{:02}:{:02}:00Z", (id / 60) % 24, id % 60),
        author_user_id: id % 3,
        author_email: format!("user{}@example.com", id % 3),
        attachments: Vec::new(),
    }
}

/// Server page of up to `limit` messages with ids below `before`.
fn server_page(newest: u64, limit: u32, before: Option<&str>) -> MessagePage {
    let upper = before.and_then(|c| c.parse::<u64>().ok()).unwrap_or(newest + 1);
    let lower = upper.saturating_sub(u64::from(limit)).max(1);
    let messages: Vec<Message> = (lower..upper).map(message).collect();
    let has_more = lower > 1;
    MessagePage {
        next_cursor: has_more.then(|| lower.to_string()),
        messages,
        has_more,
    }
}

#[derive(Debug, Clone)]
enum Op {
    /// New message pushed by the server
    Live,
    /// Redelivery of a message already pushed
    Redeliver(usize),
    /// Scroll near the top
    LoadOlder,
    /// Resolve the in-flight fetch
    Resolve,
    /// Fail the in-flight fetch
    Fail,
    /// Viewport moved
    NearBottom(bool),
    MarkRead,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Live),
        1 => (0usize..16).prop_map(Op::Redeliver),
        3 => Just(Op::LoadOlder),
        3 => Just(Op::Resolve),
        1 => Just(Op::Fail),
        2 => any::<bool>().prop_map(Op::NearBottom),
        1 => Just(Op::MarkRead),
    ]
}

proptest! {
    #[test]
    fn timeline_stays_consistent(
        history in 0u64..60,
        page_size in prop::sample::select(vec![10u32, 20, 50]),
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let mut timeline = Timeline::new(TimelineConfig { page_size });
        let mut newest = history;
        let mut pushed = Vec::new();

        let initial = timeline.begin_initial_fetch();
        let mut pending = Some(initial);

        for op in ops {
            match op {
                Op::Live => {
                    newest += 1;
                    pushed.push(newest);
                    let near_bottom = timeline.read_state().is_near_bottom;
                    let unread = timeline.read_state().unread_count;
                    let outcome = timeline.apply_live(message(newest));
                    if outcome != LiveOutcome::Duplicate {
                        let expected = if near_bottom { 0 } else { unread + 1 };
                        prop_assert_eq!(timeline.read_state().unread_count, expected);
                    }
                },
                Op::Redeliver(index) => {
                    if let Some(&id) = pushed.get(index)
                        && timeline.messages().iter().any(|m| m.id == id)
                    {
                        let before = timeline.len();
                        prop_assert_eq!(timeline.apply_live(message(id)), LiveOutcome::Duplicate);
                        prop_assert_eq!(timeline.len(), before);
                    }
                },
                Op::LoadOlder => {
                    let was_fetching = timeline.is_fetching();
                    let snapshot: Vec<u64> = timeline.messages().iter().map(|m| m.id).collect();
                    match timeline.begin_backward_fetch() {
                        Some(request) => {
                            prop_assert!(!was_fetching);
                            pending = Some(request);
                        },
                        None => {
                            let ids: Vec<u64> = timeline.messages().iter().map(|m| m.id).collect();
                            prop_assert_eq!(ids, snapshot);
                        },
                    }
                },
                Op::Resolve => {
                    if let Some(request) = pending.take() {
                        let page = server_page(
                            if request.ticket.kind() == FetchKind::Initial { history } else { newest },
                            request.limit,
                            request.before.as_deref(),
                        );
                        timeline.complete_fetch(request.ticket, page).unwrap();
                    }
                },
                Op::Fail => {
                    if let Some(request) = pending.take() {
                        timeline.fail_fetch(request.ticket).unwrap();
                    }
                },
                Op::NearBottom(near) => timeline.set_near_bottom(near),
                Op::MarkRead => timeline.mark_read(),
            }

            let ids: Vec<u64> = timeline.messages().iter().map(|m| m.id).collect();
            let unique: HashSet<u64> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), ids.len(), "duplicate ids in {:?}", ids);
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "not ascending: {:?}", ids);
            if timeline.read_state().is_near_bottom {
                prop_assert_eq!(timeline.read_state().unread_count, 0);
            }
            prop_assert_eq!(timeline.is_fetching(), pending.is_some());
        }
    }

    #[test]
    fn merge_of_initial_and_backward_pages(split in 1u64..40, older in 1u64..40) {
        let newest = split + older;
        let mut timeline = Timeline::new(TimelineConfig { page_size: u32::try_from(split).unwrap() });

        let initial = timeline.begin_initial_fetch();
        timeline.complete_fetch(initial.ticket, server_page(newest, initial.limit, None)).unwrap();

        timeline.set_page_size(u32::try_from(older).unwrap());
        let backward = timeline.begin_backward_fetch().unwrap();
        let page = server_page(newest, backward.limit, backward.before.as_deref());
        timeline.complete_fetch(backward.ticket, page).unwrap();

        let ids: Vec<u64> = timeline.messages().iter().map(|m| m.id).collect();
        prop_assert_eq!(ids, (1..=newest).collect::<Vec<_>>());
        prop_assert!(!timeline.has_more());
    }
}
