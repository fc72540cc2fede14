//! Compare-and-swap rules for mutating operations.
//!
//! These functions see only the ETag of the live record currently stored
//! (if any) and the ETag the caller supplied. They never touch a medium.

use crate::error::{Result, StoreError};
use crate::record::ETag;

/// Outcome of [`check_remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveVerdict {
    /// Nothing live to remove; report `false`.
    Absent,
    /// Delete the stored record.
    Delete,
}

/// Branch chosen by `add_or_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    Add,
    Set,
}

/// Plain equality; an empty or missing supplied ETag skips the check.
pub(crate) fn etag_matches(supplied: Option<&ETag>, current: &ETag) -> bool {
    match supplied {
        Some(supplied) if !supplied.is_empty() => supplied == current,
        _ => true,
    }
}

/// `add` succeeds only when no live record exists. The supplied ETag is ignored.
pub(crate) fn check_add(key: &str, current: Option<&ETag>) -> Result<()> {
    match current {
        Some(_) => Err(StoreError::duplicate_key(key)),
        None => Ok(()),
    }
}

/// `set` needs a live record and, when an ETag is supplied, a matching one.
///
/// Returns the current ETag so the caller can derive the next one.
pub(crate) fn check_set<'a>(
    key: &str,
    supplied: Option<&ETag>,
    current: Option<&'a ETag>,
) -> Result<&'a ETag> {
    let current = current.ok_or_else(|| StoreError::key_not_found(key))?;
    ensure_matches(key, supplied, current)?;
    Ok(current)
}

/// `remove` on an absent key is a no-op, not an error.
pub(crate) fn check_remove(
    key: &str,
    supplied: Option<&ETag>,
    current: Option<&ETag>,
) -> Result<RemoveVerdict> {
    let Some(current) = current else {
        return Ok(RemoveVerdict::Absent);
    };
    ensure_matches(key, supplied, current)?;
    Ok(RemoveVerdict::Delete)
}

/// `add_or_update` takes the `set` path when a live record exists.
pub(crate) fn choose_upsert(current: Option<&ETag>) -> Upsert {
    if current.is_some() {
        Upsert::Set
    } else {
        Upsert::Add
    }
}

fn ensure_matches(key: &str, supplied: Option<&ETag>, current: &ETag) -> Result<()> {
    if etag_matches(supplied, current) {
        return Ok(());
    }
    // etag_matches only fails for a non-empty supplied value
    let supplied = supplied.cloned().unwrap_or_else(|| ETag::new(""));
    Err(StoreError::conflict(key, supplied, current.clone()))
}
