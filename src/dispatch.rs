use std::fmt;

/// Outcome of a non-blocking dispatcher call.
///
/// Calls never fail: broker trouble is handled by the connection, and misuse
/// (an empty event name, a detached context) is ignored rather than reported
/// as an error. This tells the two apart for callers that care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    /// The call took effect; any broker request it implies has been queued.
    Accepted,
    /// The call was a no-op and nothing was sent to the broker.
    Ignored,
}

impl Dispatch {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Dispatch::Accepted)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Dispatch::Ignored)
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Accepted => write!(f, "Accepted"),
            Dispatch::Ignored => write!(f, "Ignored"),
        }
    }
}
