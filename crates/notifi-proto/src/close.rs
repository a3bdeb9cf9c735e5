//! WebSocket close codes (RFC 6455 section 7.4).

/// Close code carried by a live-channel closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// 1000: the endpoint finished what it was doing.
    pub const NORMAL: Self = Self(1000);
    /// 1001: the endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: Self = Self(1001);
    /// 1006: connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);

    /// Wrap a raw close code.
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw close code.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Closure was requested on purpose by one of the endpoints.
    ///
    /// Intentional closures never trigger a reconnect.
    pub const fn is_intentional(self) -> bool {
        matches!(self.0, 1000 | 1001)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_and_going_away_are_intentional() {
        assert!(CloseCode::NORMAL.is_intentional());
        assert!(CloseCode::GOING_AWAY.is_intentional());
        assert!(!CloseCode::ABNORMAL.is_intentional());
        assert!(!CloseCode::new(1011).is_intentional());
        assert!(!CloseCode::new(4001).is_intentional());
    }
}
