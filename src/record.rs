//! Versioned record wrapper and the ETag token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque per-write version token.
///
/// Equality is the only meaningful operation. Depending on the
/// [`EtagGenerator`](crate::EtagGenerator) in use the text is a UUID or a
/// decimal counter, but callers must not rely on either shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A value together with its version token and time-to-live.
///
/// Records handed to `add`/`set` may carry no ETag; records returned by
/// `get`/`try_get` always carry the ETag of the stored version.
///
/// # Example
///
/// ```
/// use kvstate::Record;
/// use std::time::Duration;
///
/// let record = Record::new("session-data").with_ttl(Duration::from_secs(60));
/// assert!(record.etag.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<V> {
    pub value: V,
    pub etag: Option<ETag>,
    pub ttl: Option<Duration>,
}

impl<V> Record<V> {
    /// Creates a record with no ETag that never expires.
    pub fn new(value: V) -> Self {
        Self {
            value,
            etag: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<ETag>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// The ETag to compare against, if the caller supplied a non-empty one.
    pub fn supplied_etag(&self) -> Option<&ETag> {
        self.etag.as_ref().filter(|etag| !etag.is_empty())
    }

    /// The TTL that actually applies: `None` when unset or zero.
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|ttl| !ttl.is_zero())
    }

    /// Maps the value while keeping ETag and TTL.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Record<U> {
        Record {
            value: f(self.value),
            etag: self.etag,
            ttl: self.ttl,
        }
    }
}
