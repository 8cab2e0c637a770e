//! Protocol-level close signals.
//!
//! The codes and reason strings mirror HTTP status codes and are part of the
//! client contract; changing either breaks existing clients.

/// A close code plus reason phrase sent in the WebSocket close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseSignal {
    pub code: u16,
    pub reason: &'static str,
}

pub const CLOSE_BAD_REQUEST: CloseSignal = CloseSignal {
    code: 400,
    reason: "BAD_REQUEST",
};

pub const CLOSE_UNAUTHORIZED: CloseSignal = CloseSignal {
    code: 401,
    reason: "UNAUTHORIZED",
};

pub const CLOSE_FORBIDDEN: CloseSignal = CloseSignal {
    code: 403,
    reason: "FORBIDDEN",
};

pub const CLOSE_NOT_FOUND: CloseSignal = CloseSignal {
    code: 404,
    reason: "NOT_FOUND",
};

pub const CLOSE_INTERNAL_SERVER_ERROR: CloseSignal = CloseSignal {
    code: 500,
    reason: "INTERNAL_SERVER_ERROR",
};
