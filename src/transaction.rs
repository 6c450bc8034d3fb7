use log::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

/// Single-level transaction bookkeeping over a snapshot of `T`.
///
/// BEGIN deep-copies the live state, COMMIT forgets the copy and ROLLBACK
/// hands it back. At most one transaction is open at a time.
#[derive(Debug)]
pub struct TransactionManager<T> {
    snapshot: Option<T>,
}

impl<T: Clone> TransactionManager<T> {
    pub fn new() -> Self {
        Self { snapshot: None }
    }

    pub fn state(&self) -> TransactionState {
        if self.snapshot.is_some() {
            TransactionState::InTransaction
        } else {
            TransactionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The state captured at BEGIN, while a transaction is open.
    pub fn snapshot(&self) -> Option<&T> {
        self.snapshot.as_ref()
    }

    /// Opens a transaction over a copy of `live`.
    ///
    /// # Errors
    /// [Error::TransactionState] if one is already open; the existing
    /// snapshot is kept.
    pub fn begin(&mut self, live: &T) -> Result<()> {
        if self.is_active() {
            return Err(Error::TransactionState("transaction already in progress".into()));
        }
        self.snapshot = Some(live.clone());
        debug!("transaction snapshot taken");
        Ok(())
    }

    /// Closes the transaction, discarding the snapshot.
    pub fn commit(&mut self) -> Result<()> {
        self.take_snapshot().map(drop)
    }

    /// Closes the transaction and returns the state captured at BEGIN.
    pub fn rollback(&mut self) -> Result<T> {
        self.take_snapshot()
    }

    fn take_snapshot(&mut self) -> Result<T> {
        self.snapshot
            .take()
            .ok_or_else(|| Error::TransactionState("no transaction in progress".into()))
    }
}

impl<T: Clone> Default for TransactionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
