//! Property-based tests for the store contract.
//!
//! # Tested Invariants
//!
//! - A successful add makes the key present and blocks every later add
//! - A conditional set succeeds exactly when the ETag matches or is empty
//! - A record is visible for its whole lifetime and absent afterwards

use std::time::Duration;

use proptest::prelude::*;

use super::Storage;
use crate::clock::ManualClock;
use crate::error::StoreError;
use crate::etag::EtagScheme;
use crate::medium::{MemoryMedium, Partition};
use crate::record::{ETag, Record};

// ============================================================================
// Test Strategies - Input Generation
// ============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:/._-]{1,32}"
}

/// Supplied ETag for a conditional set: `None` means "use the current one".
fn supplied_etag_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "[a-f0-9]{1,12}".prop_map(Some),
    ]
}

fn scheme_strategy() -> impl Strategy<Value = EtagScheme> {
    prop_oneof![Just(EtagScheme::Uuid), Just(EtagScheme::Counter)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn partition() -> Partition {
    Partition::new("props", "records")
}

// ============================================================================
// Uniqueness
// ============================================================================

proptest! {
    /// After a successful add the key is present and any second add fails
    /// with `DuplicateKey`, whatever the second record carries.
    #[test]
    fn add_is_unique(
        key in key_strategy(),
        first in any::<i64>(),
        second in any::<i64>(),
        second_etag in proptest::option::of("[a-z0-9]{0,8}"),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Storage::memory().open::<i64>(partition()).unwrap();
            let e1 = store.add(&key, Record::new(first)).await.unwrap();
            prop_assert!(store.contains_key(&key).await.unwrap());

            let mut record = Record::new(second);
            if let Some(etag) = second_etag {
                record = record.with_etag(etag);
            }
            let err = store.add(&key, record).await.unwrap_err();
            prop_assert!(err.is_duplicate());

            let stored = store.get(&key).await.unwrap();
            prop_assert_eq!(stored.value, first);
            prop_assert_eq!(stored.etag, Some(e1));
            Ok(())
        })?;
    }
}

// ============================================================================
// Compare-and-swap
// ============================================================================

proptest! {
    /// A set succeeds iff the supplied ETag equals the current one or is
    /// empty; otherwise the conflict reports both ETags and nothing changes.
    #[test]
    fn set_succeeds_iff_etag_matches(
        key in key_strategy(),
        supplied in supplied_etag_strategy(),
        scheme in scheme_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let storage = Storage::builder(MemoryMedium::new())
                .etag_scheme(scheme)
                .build();
            let store = storage.open::<i64>(partition()).unwrap();
            let current = store.add(&key, Record::new(1)).await.unwrap();

            let supplied = supplied.map_or_else(|| current.clone(), ETag::from);
            let should_succeed = supplied.is_empty() || supplied == current;

            match store.set(&key, Record::new(2).with_etag(supplied.clone())).await {
                Ok(fresh) => {
                    prop_assert!(should_succeed);
                    prop_assert_ne!(&fresh, &current);
                    prop_assert_eq!(store.get(&key).await.unwrap().etag, Some(fresh));
                },
                Err(StoreError::ConcurrencyConflict { supplied: s, current: c, .. }) => {
                    prop_assert!(!should_succeed);
                    prop_assert_eq!(s, supplied);
                    prop_assert_eq!(&c, &current);
                    prop_assert_eq!(store.get(&key).await.unwrap().value, 1);
                },
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
            Ok(())
        })?;
    }

    /// Every successful write hands out an ETag different from the last one.
    #[test]
    fn writes_always_rotate_etag(
        writes in 1usize..20,
        scheme in scheme_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let storage = Storage::builder(MemoryMedium::new())
                .etag_scheme(scheme)
                .build();
            let store = storage.open::<usize>(partition()).unwrap();
            let mut previous = store.add("k", Record::new(0)).await.unwrap();

            for i in 1..=writes {
                let next = store.set("k", Record::new(i)).await.unwrap();
                prop_assert_ne!(&next, &previous);
                previous = next;
            }
            Ok(())
        })?;
    }
}

// ============================================================================
// Expiry
// ============================================================================

proptest! {
    /// A record with TTL `d` stored at `t0` is visible for every
    /// `t0 <= t < t0 + d` and absent for every `t >= t0 + d`, down to
    /// nanosecond TTLs.
    #[test]
    fn expiry_is_monotonic(
        ttl_ns in 1u64..2_000_000_000,
        elapsed_ns in 0u64..4_000_000_000,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let clock = ManualClock::default();
            let storage = Storage::builder(MemoryMedium::new())
                .clock(clock.clone())
                .build();
            let store = storage.open::<i64>(partition()).unwrap();

            store
                .add("k", Record::new(7).with_ttl(Duration::from_nanos(ttl_ns)))
                .await
                .unwrap();
            clock.advance(Duration::from_nanos(elapsed_ns));

            let found = store.try_get("k").await.unwrap();
            if elapsed_ns < ttl_ns {
                prop_assert_eq!(found.map(|r| r.value), Some(7));
            } else {
                prop_assert!(found.is_none());
                prop_assert!(!store.contains_key("k").await.unwrap());
            }
            Ok(())
        })?;
    }
}
