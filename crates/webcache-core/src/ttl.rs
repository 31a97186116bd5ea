//! Maximum acceptable age of a cached entry.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// How old a cached entry may be before it must be recomputed.
///
/// The signed-seconds form used by configuration and the CLI maps as
/// `0 => Refresh`, `< 0 => Forever`, `> 0 => MaxAge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Always stale: recompute and overwrite.
    Refresh,
    /// Never stale once an entry has been written.
    Forever,
    /// Stale once the entry is older than the given age.
    MaxAge(Duration),
}

impl Ttl {
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Ttl::Refresh,
            s if s < 0 => Ttl::Forever,
            s => Ttl::MaxAge(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Signed-seconds form; `Forever` maps to `-1`.
    pub fn as_secs(&self) -> i64 {
        match self {
            Ttl::Refresh => 0,
            Ttl::Forever => -1,
            Ttl::MaxAge(age) => i64::try_from(age.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Oldest modification time still considered fresh, if the policy has one.
    ///
    /// `None` for `Forever`; `Refresh` yields "now".
    pub fn cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        match self {
            Ttl::Refresh => Some(now),
            Ttl::Forever => None,
            Ttl::MaxAge(age) => Some(now.checked_sub(*age).unwrap_or(SystemTime::UNIX_EPOCH)),
        }
    }

    /// Whether an entry last modified at `modified` is still fresh at `now`.
    pub fn is_fresh(&self, modified: SystemTime, now: SystemTime) -> bool {
        match self {
            Ttl::Refresh => false,
            Ttl::Forever => true,
            Ttl::MaxAge(age) => match now.duration_since(modified) {
                Ok(elapsed) => elapsed < *age,
                // Modified "in the future" (clock skew): treat as fresh.
                Err(_) => true,
            },
        }
    }
}

impl From<Duration> for Ttl {
    fn from(age: Duration) -> Self {
        if age.is_zero() {
            Ttl::Refresh
        } else {
            Ttl::MaxAge(age)
        }
    }
}
