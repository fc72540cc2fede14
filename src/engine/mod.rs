//! Shared concurrency and expiration rules.
//!
//! Every medium goes through these functions via
//! [`RecordStore`](crate::RecordStore); adapters never compare ETags or
//! evaluate TTLs themselves.

pub(crate) mod concurrency;
pub(crate) mod expiration;
