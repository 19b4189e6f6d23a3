// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Record Store Abstraction
//!
//! The protocol mutates records only through this trait, so storage
//! technology is swappable and testable without a live relay. Each method is
//! individually atomic; in particular short-code assignment is a
//! check-then-insert that must hold against concurrent allocations.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

use super::record::{ExchangeRecord, ShortCode};

/// Store error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Exchange id already present")]
    DuplicateExchangeId,
}

/// Outcome of an atomic short-code assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// Code bound to the record.
    Assigned,
    /// Code already in use by another live record; caller should retry with
    /// a fresh candidate.
    Collision,
    /// The record already holds a code; a second assignment would orphan the
    /// first in the index.
    AlreadyAssigned,
    /// No record with that exchange id.
    UnknownExchange,
}

/// Storage for exchange records.
///
/// Implementations must not resurrect removed records and must keep the
/// short-code index consistent with record contents. Callers never set
/// `short_code` through [`RecordStore::update`]; assignment goes through
/// [`RecordStore::try_assign_short_code`].
pub trait RecordStore: Send + Sync {
    /// Inserts a new record, failing if the exchange id is already present.
    fn insert(&self, record: ExchangeRecord) -> Result<(), StoreError>;

    /// Fetches a record snapshot by internal id.
    fn get(&self, exchange_id: &Uuid) -> Option<ExchangeRecord>;

    /// Fetches a record snapshot by short code.
    fn get_by_short_code(&self, code: &ShortCode) -> Option<ExchangeRecord>;

    /// Applies a mutation to the record under the store lock. Returns false
    /// if the record does not exist.
    fn update(&self, exchange_id: &Uuid, apply: &mut dyn FnMut(&mut ExchangeRecord)) -> bool;

    /// Atomically binds `code` to the record if no live record holds the
    /// code and the record holds no code yet.
    fn try_assign_short_code(&self, exchange_id: &Uuid, code: &ShortCode) -> AssignOutcome;

    /// Removes records whose `expires_at` has elapsed. Returns how many were
    /// removed.
    fn remove_expired(&self, now: u64) -> usize;
}

#[derive(Default)]
struct MemoryStoreInner {
    records: HashMap<Uuid, ExchangeRecord>,
    by_code: HashMap<String, Uuid>,
}

/// In-memory reference store. One mutex guards both maps, which is what makes
/// check-then-insert of a short code atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().expect("record store mutex poisoned")
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: ExchangeRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.records.contains_key(&record.exchange_id) {
            return Err(StoreError::DuplicateExchangeId);
        }
        inner.records.insert(record.exchange_id, record);
        Ok(())
    }

    fn get(&self, exchange_id: &Uuid) -> Option<ExchangeRecord> {
        self.lock().records.get(exchange_id).cloned()
    }

    fn get_by_short_code(&self, code: &ShortCode) -> Option<ExchangeRecord> {
        let inner = self.lock();
        let id = inner.by_code.get(code.as_str())?;
        inner.records.get(id).cloned()
    }

    fn update(&self, exchange_id: &Uuid, apply: &mut dyn FnMut(&mut ExchangeRecord)) -> bool {
        let mut inner = self.lock();
        match inner.records.get_mut(exchange_id) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }

    fn try_assign_short_code(&self, exchange_id: &Uuid, code: &ShortCode) -> AssignOutcome {
        let mut inner = self.lock();
        if inner.by_code.contains_key(code.as_str()) {
            return AssignOutcome::Collision;
        }
        match inner.records.get_mut(exchange_id) {
            Some(record) => {
                if record.short_code.is_some() {
                    return AssignOutcome::AlreadyAssigned;
                }
                record.short_code = Some(code.clone());
            }
            None => return AssignOutcome::UnknownExchange,
        }
        inner.by_code.insert(code.as_str().to_string(), *exchange_id);
        AssignOutcome::Assigned
    }

    fn remove_expired(&self, now: u64) -> usize {
        let mut inner = self.lock();
        let expired: Vec<Uuid> = inner
            .records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.exchange_id)
            .collect();

        for id in &expired {
            if let Some(record) = inner.records.remove(id) {
                if let Some(code) = record.short_code {
                    inner.by_code.remove(code.as_str());
                }
            }
        }
        expired.len()
    }
}
