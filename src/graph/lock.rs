//! Entity checkout table
//!
//! An entity created or modified by a transaction is checked out to that
//! transaction until it closes. A second transaction touching the same entity
//! blocks until the owner releases it (or until the configured timeout).
//! Checkout is re-entrant per transaction.
//!
//! Whenever more than one entity must be held at once, callers acquire them in
//! ascending [`Identity`] order.

use super::error::{acquire_lock, GraphError, GraphResult};
use super::types::{Identity, TxId};
use rustc_hash::FxHashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct LockTable {
    owners: Mutex<FxHashMap<Identity, TxId>>,
    released: Condvar,
    timeout: Option<Duration>,
}

impl LockTable {
    pub fn new(timeout: Option<Duration>) -> Self {
        LockTable {
            owners: Mutex::new(FxHashMap::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Check `id` out to `tx`, blocking while another transaction holds it.
    ///
    /// Returns `true` if this call took the lock and `false` if `tx` already
    /// held it.
    pub fn acquire(&self, id: &Identity, tx: TxId) -> GraphResult<bool> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut owners = acquire_lock(&self.owners)?;

        loop {
            match owners.get(id) {
                None => {
                    owners.insert(id.clone(), tx);
                    return Ok(true);
                }
                Some(owner) if *owner == tx => return Ok(false),
                Some(owner) => {
                    debug!(entity = %id, waiter = %tx, owner = %owner, "waiting for entity lock");
                }
            }

            owners = match deadline {
                None => self
                    .released
                    .wait(owners)
                    .map_err(|_| GraphError::LockPoisoned)?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        warn!(entity = %id, tx = %tx, "lock acquisition timed out");
                        return Err(GraphError::LockTimeout(id.clone()));
                    }
                    self.released
                        .wait_timeout(owners, remaining)
                        .map_err(|_| GraphError::LockPoisoned)?
                        .0
                }
            };
        }
    }

    /// Release every listed entity held by `tx` and wake waiters
    pub fn release_all<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a Identity>,
        tx: TxId,
    ) -> GraphResult<()> {
        let mut owners = acquire_lock(&self.owners)?;
        let mut released = 0usize;
        for id in ids {
            if owners.get(id) == Some(&tx) {
                owners.remove(id);
                released += 1;
            }
        }
        drop(owners);

        if released > 0 {
            self.released.notify_all();
        }
        Ok(())
    }

    pub fn owner(&self, id: &Identity) -> GraphResult<Option<TxId>> {
        Ok(acquire_lock(&self.owners)?.get(id).copied())
    }

    pub fn held_count(&self) -> GraphResult<usize> {
        Ok(acquire_lock(&self.owners)?.len())
    }
}
