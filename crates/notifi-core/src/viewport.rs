//! Scroll/viewport decisions.
//!
//! Turns viewport geometry into policy: whether the user is near the bottom
//! (so new messages count as read), whether to load older history, and where
//! to scroll after content changes. No rendering happens here; the host
//! reports geometry and executes [`ScrollCommand`]s.
//!
//! Scroll commands that depend on the new content height are deferred until
//! the host reports the post-render layout through
//! [`ScrollCoordinator::on_layout`].

use tracing::debug;

use crate::timeline::{FetchKind, FetchRequest, FetchTicket, LiveOutcome, Timeline};

/// Distance from the bottom under which the viewport counts as at the bottom.
pub const NEAR_BOTTOM_PX: u32 = 100;

/// Distance from the top under which older history is requested.
pub const NEAR_TOP_PX: u32 = 100;

/// Viewport thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    /// Near-bottom threshold in pixels
    pub near_bottom_px: u32,
    /// Near-top threshold in pixels
    pub near_top_px: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { near_bottom_px: NEAR_BOTTOM_PX, near_top_px: NEAR_TOP_PX }
    }
}

/// Scroll geometry of the message container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportGeometry {
    /// Offset of the visible area from the top of the content
    pub scroll_top: u32,
    /// Total content height
    pub scroll_height: u32,
    /// Visible height
    pub client_height: u32,
}

impl ViewportGeometry {
    /// Describe a viewport.
    pub fn new(scroll_top: u32, scroll_height: u32, client_height: u32) -> Self {
        Self { scroll_top, scroll_height, client_height }
    }

    /// Pixels between the bottom of the visible area and the end of content.
    pub fn distance_from_bottom(&self) -> u32 {
        self.scroll_height.saturating_sub(self.scroll_top).saturating_sub(self.client_height)
    }

    /// Within the near-bottom threshold.
    pub fn is_near_bottom(&self, config: &ViewportConfig) -> bool {
        self.distance_from_bottom() < config.near_bottom_px
    }

    /// Within the near-top threshold.
    pub fn is_near_top(&self, config: &ViewportConfig) -> bool {
        self.scroll_top < config.near_top_px
    }
}

/// How to animate a scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollBehavior {
    /// Jump without animation
    Instant,
    /// Animate
    Smooth,
}

/// Scroll position captured before content is prepended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnchor {
    scroll_top: u32,
    scroll_height: u32,
}

impl ScrollAnchor {
    /// Capture the current position.
    pub fn capture(geometry: &ViewportGeometry) -> Self {
        Self { scroll_top: geometry.scroll_top, scroll_height: geometry.scroll_height }
    }

    /// Offset that keeps the same content visible after the content grew to
    /// `new_scroll_height` above the viewport.
    pub fn restore(&self, new_scroll_height: u32) -> u32 {
        self.scroll_top.saturating_add(new_scroll_height.saturating_sub(self.scroll_height))
    }
}

/// Scroll the host should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Scroll to the end of content
    ToBottom(ScrollBehavior),
    /// Set the scroll offset
    To {
        /// New `scroll_top`
        top: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingScroll {
    Bottom(ScrollBehavior),
    Restore(ScrollAnchor),
}

/// Viewport policy state.
#[derive(Debug, Clone, Default)]
pub struct ScrollCoordinator {
    config: ViewportConfig,
    geometry: ViewportGeometry,
    /// Anchor of the in-flight backward fetch
    anchor: Option<(FetchTicket, ScrollAnchor)>,
    /// Scroll to perform after the next layout
    pending: Option<PendingScroll>,
}

impl ScrollCoordinator {
    /// Create a coordinator.
    pub fn new(config: ViewportConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Last reported geometry.
    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    /// Thresholds in use.
    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    /// User scrolled.
    ///
    /// Updates the near-bottom flag and, near the top, starts a backward
    /// fetch, remembering the position so it can be restored once the page
    /// has been rendered.
    pub fn on_scroll(
        &mut self,
        geometry: ViewportGeometry,
        timeline: &mut Timeline,
    ) -> Option<FetchRequest> {
        self.geometry = geometry;
        timeline.set_near_bottom(geometry.is_near_bottom(&self.config));

        if !geometry.is_near_top(&self.config) {
            return None;
        }
        let request = timeline.begin_backward_fetch()?;
        debug!(ticket = %request.ticket, scroll_top = geometry.scroll_top, "near top, loading older");
        self.anchor = Some((request.ticket, ScrollAnchor::capture(&geometry)));
        Some(request)
    }

    /// A history page was applied to `timeline`.
    ///
    /// `was_empty` is whether the timeline was empty before the page.
    pub fn on_page_applied(&mut self, ticket: FetchTicket, was_empty: bool, timeline: &mut Timeline) {
        match ticket.kind() {
            FetchKind::Initial => {
                self.anchor = None;
                if was_empty && !timeline.is_empty() {
                    timeline.set_near_bottom(true);
                    self.pending = Some(PendingScroll::Bottom(ScrollBehavior::Instant));
                }
            },
            FetchKind::Backward => {
                if let Some((anchored, anchor)) = self.anchor.take()
                    && anchored == ticket
                {
                    self.pending = Some(PendingScroll::Restore(anchor));
                }
            },
        }
    }

    /// A fetch ended without a page.
    pub fn on_fetch_abandoned(&mut self, ticket: FetchTicket) {
        if self.anchor.is_some_and(|(anchored, _)| anchored == ticket) {
            self.anchor = None;
        }
    }

    /// A live message was applied.
    ///
    /// Follows the tail while the viewport is at the bottom. `was_empty` is
    /// whether the timeline was empty before the message; first content
    /// jumps to the bottom instantly.
    pub fn on_live(&mut self, outcome: LiveOutcome, was_empty: bool, timeline: &Timeline) {
        if outcome == LiveOutcome::Duplicate {
            return;
        }
        if was_empty && !timeline.is_empty() {
            self.pending = Some(PendingScroll::Bottom(ScrollBehavior::Instant));
            return;
        }
        if !timeline.read_state().is_near_bottom {
            return;
        }
        if self.pending.is_none() {
            self.pending = Some(PendingScroll::Bottom(ScrollBehavior::Smooth));
        }
    }

    /// Host rendered and reports the new content height.
    pub fn on_layout(&mut self, scroll_height: u32) -> Option<ScrollCommand> {
        self.geometry.scroll_height = scroll_height;

        let command = match self.pending.take()? {
            PendingScroll::Bottom(behavior) => {
                self.geometry.scroll_top =
                    scroll_height.saturating_sub(self.geometry.client_height);
                ScrollCommand::ToBottom(behavior)
            },
            PendingScroll::Restore(anchor) => {
                let top = anchor.restore(scroll_height);
                self.geometry.scroll_top = top;
                ScrollCommand::To { top }
            },
        };
        debug!(command = ?command, "scroll after layout");
        Some(command)
    }

    /// Explicit "jump to bottom": marks everything read and scrolls smoothly.
    pub fn jump_to_bottom(&mut self, timeline: &mut Timeline) -> ScrollCommand {
        timeline.set_near_bottom(true);
        self.pending = None;
        ScrollCommand::ToBottom(ScrollBehavior::Smooth)
    }

    /// Forget pending scrolls and anchors.
    pub fn reset(&mut self) {
        self.anchor = None;
        self.pending = None;
    }
}
