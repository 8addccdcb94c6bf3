//! Single-use nonce bookkeeping.
//!
//! Every accepted payment consumes its nonce for the lifetime of the ledger.
//! The gasless path spans two facilitator round trips, so nonces there move
//! through a two-phase lifecycle:
//!
//! ```text
//! (absent) --reserve--> Pending --commit--> Used
//!                          |
//!                          +----release---> (absent)
//! ```
//!
//! A [`NonceReservation`] guard owns a `Pending` entry and releases it when
//! dropped without being committed, so a cancelled or timed-out request
//! never leaves a nonce stuck.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use alloy_primitives::B256;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::amount::TokenAmount;

/// A nonce, namespaced by the payment mode that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonceKey {
    /// `uint256` nonce of a traditional marketplace payment.
    Traditional(TokenAmount),
    /// `bytes32` nonce of a gasless authorization.
    Authorization(B256),
}

impl Display for NonceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Traditional(nonce) => write!(f, "{nonce}"),
            Self::Authorization(nonce) => write!(f, "{nonce}"),
        }
    }
}

/// Ledger state of a known nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    /// Reserved by an in-flight gasless payment.
    Pending,
    /// Consumed by an accepted payment.
    Used,
}

/// The nonce could not be reserved or claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("nonce {key} is already {state:?}")]
pub struct NonceConflict {
    /// The contested nonce.
    pub key: NonceKey,
    /// Its state at the time of the attempt.
    pub state: NonceState,
}

/// Shared store of consumed nonces.
///
/// Implementations must make `try_mark_used` and `reserve` atomic with
/// respect to each other: for a given key at most one caller may succeed.
pub trait NonceLedger: Send + Sync + fmt::Debug {
    /// State of `key`, `None` when never seen or released.
    fn state(&self, key: &NonceKey) -> Option<NonceState>;

    /// Returns `true` when `key` is pending or used.
    fn is_used(&self, key: &NonceKey) -> bool {
        self.state(key).is_some()
    }

    /// Marks an unseen `key` as used in one step.
    ///
    /// # Errors
    ///
    /// Returns [`NonceConflict`] when the key is pending or used.
    fn try_mark_used(&self, key: NonceKey) -> Result<(), NonceConflict>;

    /// Moves an unseen `key` to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`NonceConflict`] when the key is pending or used.
    fn try_reserve(&self, key: NonceKey) -> Result<(), NonceConflict>;

    /// Moves a pending `key` to `Used`.
    fn commit(&self, key: &NonceKey);

    /// Forgets a pending `key`. Used keys are never released.
    fn release(&self, key: &NonceKey);
}

/// Reserves `key` and returns a guard that releases it unless committed.
///
/// # Errors
///
/// Returns [`NonceConflict`] when the key is pending or used.
pub fn reserve(
    ledger: &Arc<dyn NonceLedger>,
    key: NonceKey,
) -> Result<NonceReservation, NonceConflict> {
    ledger.try_reserve(key)?;
    Ok(NonceReservation {
        ledger: Arc::clone(ledger),
        key,
        committed: false,
    })
}

/// In-process ledger backed by a concurrent hash map.
///
/// State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryNonceLedger {
    entries: DashMap<NonceKey, NonceState>,
}

impl InMemoryNonceLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending or used nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no nonce has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_if_absent(&self, key: NonceKey, state: NonceState) -> Result<(), NonceConflict> {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => Err(NonceConflict {
                key,
                state: *existing.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(())
            }
        }
    }
}

impl NonceLedger for InMemoryNonceLedger {
    fn state(&self, key: &NonceKey) -> Option<NonceState> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    fn try_mark_used(&self, key: NonceKey) -> Result<(), NonceConflict> {
        self.insert_if_absent(key, NonceState::Used)
    }

    fn try_reserve(&self, key: NonceKey) -> Result<(), NonceConflict> {
        self.insert_if_absent(key, NonceState::Pending)
    }

    fn commit(&self, key: &NonceKey) {
        self.entries.insert(*key, NonceState::Used);
        #[cfg(feature = "telemetry")]
        tracing::debug!(nonce = %key, "nonce committed");
    }

    fn release(&self, key: &NonceKey) {
        let released = self
            .entries
            .remove_if(key, |_, state| *state == NonceState::Pending)
            .is_some();
        #[cfg(feature = "telemetry")]
        if released {
            tracing::debug!(nonce = %key, "nonce released");
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = released;
    }
}

/// A pending nonce owned by one in-flight payment.
///
/// Dropping the guard releases the nonce; [`NonceReservation::commit`]
/// consumes it for good.
#[must_use = "dropping a reservation releases the nonce"]
pub struct NonceReservation {
    ledger: Arc<dyn NonceLedger>,
    key: NonceKey,
    committed: bool,
}

impl NonceReservation {
    /// The reserved nonce.
    #[must_use]
    pub const fn key(&self) -> NonceKey {
        self.key
    }

    /// Marks the nonce used.
    pub fn commit(mut self) {
        self.ledger.commit(&self.key);
        self.committed = true;
    }
}

impl fmt::Debug for NonceReservation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceReservation")
            .field("key", &self.key)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.release(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Arc<dyn NonceLedger> {
        Arc::new(InMemoryNonceLedger::new())
    }

    #[test]
    fn test_try_mark_used_is_single_use() {
        let ledger = ledger();
        let key = NonceKey::Traditional(TokenAmount::from(7_u64));
        assert!(!ledger.is_used(&key));
        ledger.try_mark_used(key).unwrap();
        assert!(ledger.is_used(&key));
        let conflict = ledger.try_mark_used(key).unwrap_err();
        assert_eq!(conflict.state, NonceState::Used);
    }

    #[test]
    fn test_modes_do_not_share_nonces() {
        let ledger = ledger();
        ledger
            .try_mark_used(NonceKey::Traditional(TokenAmount::ZERO))
            .unwrap();
        assert!(!ledger.is_used(&NonceKey::Authorization(B256::ZERO)));
    }

    #[test]
    fn test_dropped_reservation_releases() {
        let ledger = ledger();
        let key = NonceKey::Authorization(B256::repeat_byte(1));
        {
            let reservation = reserve(&ledger, key).unwrap();
            assert_eq!(reservation.key(), key);
            assert_eq!(ledger.state(&key), Some(NonceState::Pending));
            assert!(reserve(&ledger, key).is_err());
        }
        assert_eq!(ledger.state(&key), None);
        assert!(reserve(&ledger, key).is_ok());
    }

    #[test]
    fn test_committed_reservation_stays_used() {
        let ledger = ledger();
        let key = NonceKey::Authorization(B256::repeat_byte(2));
        reserve(&ledger, key).unwrap().commit();
        assert_eq!(ledger.state(&key), Some(NonceState::Used));
        ledger.release(&key);
        assert_eq!(ledger.state(&key), Some(NonceState::Used));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let ledger = ledger();
        let key = NonceKey::Authorization(B256::repeat_byte(3));
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| usize::from(ledger.try_mark_used(key).is_ok())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
