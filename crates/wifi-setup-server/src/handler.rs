//! Result notification for connection sessions.

use std::fmt;
use std::net::Ipv4Addr;

/// How a portal or connection session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Associated with the network and obtained an address.
    Connected { ip: Ipv4Addr },
    /// Setup failed or retries were exhausted.
    Failed,
    /// The portal or the connected grace period expired.
    TimedOut,
    /// The caller ended the session, or the link dropped after connecting.
    Disconnected,
}

impl ConnectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectionOutcome::Connected { .. })
    }
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionOutcome::Connected { ip } => write!(f, "connected ({})", ip),
            ConnectionOutcome::Failed => f.write_str("failed"),
            ConnectionOutcome::TimedOut => f.write_str("timed out"),
            ConnectionOutcome::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Receives the outcome of a session.
///
/// Called from the connection manager task, at most once per outcome.
/// Implementations must not block.
pub trait ResultHandler: Send + Sync {
    fn on_result(&self, outcome: ConnectionOutcome);
}

impl<F> ResultHandler for F
where
    F: Fn(ConnectionOutcome) + Send + Sync,
{
    fn on_result(&self, outcome: ConnectionOutcome) {
        self(outcome)
    }
}
