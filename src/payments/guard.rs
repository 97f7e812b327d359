use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::{BillingError, Result};
use crate::types::LoanId;

type LoanLock = Arc<Mutex<()>>;

/// per-loan exclusive locks, created lazily
///
/// The registry mutex is only held to fetch or create an entry. Once the table
/// reaches `capacity`, entries nobody holds or waits on are dropped before a new
/// one is inserted. An idle entry is referenced by the table alone, so the next
/// request for that loan simply gets a fresh lock.
#[derive(Debug)]
pub struct LoanLockRegistry {
    locks: Mutex<HashMap<LoanId, LoanLock>>,
    capacity: usize,
}

impl LoanLockRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// number of loans with a lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, loan_id: LoanId) -> LoanLock {
        let mut locks = self.locks.lock();

        if let Some(lock) = locks.get(&loan_id) {
            return Arc::clone(lock);
        }

        if locks.len() >= self.capacity {
            let before = locks.len();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            tracing::debug!(
                evicted = before - locks.len(),
                remaining = locks.len(),
                "pruned idle loan locks"
            );
        }

        let lock = LoanLock::default();
        locks.insert(loan_id, Arc::clone(&lock));
        lock
    }

    /// run `f` while holding the loan's lock
    ///
    /// With a timeout, gives up with [`BillingError::LockTimeout`] instead of
    /// waiting behind a slow attempt indefinitely.
    ///
    /// Attempts on one loan never overlap, but they are not strictly admitted in
    /// arrival order: `parking_lot` locks are only eventually fair, so a thread that
    /// arrives later can occasionally barge ahead of one already waiting.
    pub fn with_loan_lock<T>(
        &self,
        loan_id: LoanId,
        timeout: Option<Duration>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let lock = self.lock_for(loan_id);

        let _guard = match timeout {
            Some(timeout) => lock.try_lock_for(timeout).ok_or(BillingError::LockTimeout {
                loan_id,
                waited_ms: timeout.as_millis() as u64,
            })?,
            None => lock.lock(),
        };

        f()
    }
}

impl Default for LoanLockRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}
