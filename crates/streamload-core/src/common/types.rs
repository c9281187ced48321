//! # Session identities and protocol defaults
//!
//! A [`SessionId`] is handed out by the coordinator from a monotonically
//! increasing counter, so an identity is never reissued during a run. It is
//! rendered as its decimal index, both in logs and inside the initial stream
//! payload (`"Ping <id>"`).

use core::fmt;

/// Default address of the greeter server under test.
pub const DEFAULT_SERVER_ADDR: &str = "localhost:7788";

/// Prefix of the first message every session writes to its stream.
pub const PING_PREFIX: &str = "Ping";

/// Identity of a single simulated client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u64 {
        self.0
    }

    /// Payload of the initial stream message carrying this identity.
    pub fn ping_payload(self) -> String {
        format!("{PING_PREFIX} {}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
