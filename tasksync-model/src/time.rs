//! Wall-clock timestamps as milliseconds since the Unix epoch.
//!
//! The remote store assigns authoritative timestamps at commit time;
//! locally-constructed provisional entities carry [`Timestamp::now`] values
//! until the next snapshot replaces them.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Returns the current wall-clock time.
    ///
    /// Clocks before the epoch collapse to zero rather than failing.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self(millis)
    }

    /// Creates a timestamp from raw epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns this timestamp shifted forward by `millis`, saturating at the
    /// maximum representable instant.
    #[must_use]
    pub const fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}
