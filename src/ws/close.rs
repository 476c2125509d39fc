//! WebSocket close status codes (RFC 6455 section 7.4).

use std::fmt;

/// Close status carried on a WebSocket disconnect, either requested by
/// the caller or reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseStatus(pub u16);

impl CloseStatus {
    pub const NORMAL: CloseStatus = CloseStatus(1000);
    pub const GOING_AWAY: CloseStatus = CloseStatus(1001);
    pub const PROTOCOL_ERROR: CloseStatus = CloseStatus(1002);
    pub const UNSUPPORTED: CloseStatus = CloseStatus(1003);
    pub const ABNORMAL_CLOSE: CloseStatus = CloseStatus(1006);
    pub const INCONSISTENT_DATATYPE: CloseStatus = CloseStatus(1007);
    pub const POLICY_VIOLATION: CloseStatus = CloseStatus(1008);
    pub const TOO_BIG: CloseStatus = CloseStatus(1009);
    pub const NEGOTIATE_ERROR: CloseStatus = CloseStatus(1010);
    pub const SERVER_TERMINATE: CloseStatus = CloseStatus(1011);
    pub const UNKNOWN_ERROR: CloseStatus = CloseStatus(4000);

    pub fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
