//! Fresh ETag generation.
//!
//! Two numbering schemes are bundled:
//!
//! - [`UuidEtags`] (default): a random v4 UUID per write.
//! - [`CounterEtags`]: decimal numbers that only ever grow. Each value is
//!   above both the replaced record's ETag and every number the generator
//!   has handed out before, so removing or expiring a key never brings an
//!   old ETag back.

use crate::record::ETag;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Which numbering scheme a generator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EtagScheme {
    #[default]
    Uuid,
    Counter,
}

impl EtagScheme {
    /// Builds the generator for this scheme.
    ///
    /// Counters are seeded from the wall clock in microseconds, so a
    /// restarted process starts above the numbers an earlier one issued.
    pub fn generator(self) -> Box<dyn EtagGenerator> {
        match self {
            Self::Uuid => Box::new(UuidEtags),
            Self::Counter => {
                let seed = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
                Box::new(CounterEtags::starting_at(seed))
            },
        }
    }
}

/// Produces the ETag stamped on every successful write.
///
/// `previous` is the ETag of the live record being replaced, or `None` when
/// the key is absent. The result must differ from `previous`.
pub trait EtagGenerator: Send + Sync + 'static {
    fn next(&self, previous: Option<&ETag>) -> ETag;

    fn scheme(&self) -> EtagScheme;
}

/// Random UUID ETags.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidEtags;

impl EtagGenerator for UuidEtags {
    fn next(&self, _previous: Option<&ETag>) -> ETag {
        ETag::new(Uuid::new_v4().to_string())
    }

    fn scheme(&self) -> EtagScheme {
        EtagScheme::Uuid
    }
}

/// Monotonic counter ETags.
///
/// Holds a high-water mark of every number issued. The next ETag is the
/// larger of `previous + 1` and `high_water + 1`.
#[derive(Debug, Default)]
pub struct CounterEtags {
    high_water: AtomicU64,
}

impl CounterEtags {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose first ETag is above `issued`.
    pub fn starting_at(issued: u64) -> Self {
        Self {
            high_water: AtomicU64::new(issued),
        }
    }
}

impl EtagGenerator for CounterEtags {
    fn next(&self, previous: Option<&ETag>) -> ETag {
        // A non-numeric previous value was written under another scheme and
        // cannot collide with a number.
        let after_previous = previous
            .and_then(|etag| etag.as_str().parse::<u64>().ok())
            .and_then(|n| n.checked_add(1))
            .unwrap_or(1);

        let bump = |high_water: u64| high_water.saturating_add(1).max(after_previous);
        let issued = self
            .high_water
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |hw| Some(bump(hw)))
            .map_or_else(bump, bump);
        ETag::new(issued.to_string())
    }

    fn scheme(&self) -> EtagScheme {
        EtagScheme::Counter
    }
}
