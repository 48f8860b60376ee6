//! In-memory repository shared by the reference workers.
//!
//! Rows are keyed by a store-assigned id starting at 1. Multi-row checks
//! (unique fields, picking the shortest queue) run under one write lock via
//! [`MemoryStore::transaction`]. A store switched unavailable fails every
//! operation with [`StoreError::Unavailable`].

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use centermesh::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{entity} store is unavailable")]
    Unavailable { entity: &'static str },
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => DomainError::not_found(err.to_string()),
            StoreError::Conflict(message) => DomainError::conflict(message),
            StoreError::Invalid(message) => DomainError::invalid(message),
            StoreError::Unavailable { .. } => DomainError::unavailable(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub struct MemoryStore<T> {
    entity: &'static str,
    rows: RwLock<BTreeMap<u64, T>>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing storage going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable { entity: self.entity })
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn not_found(&self, id: u64) -> StoreError {
        StoreError::NotFound {
            entity: self.entity,
            id,
        }
    }

    /// Insert a row built from its freshly assigned id
    pub fn insert_with(&self, build: impl FnOnce(u64) -> T) -> StoreResult<T> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = build(id);
        self.rows.write().insert(id, row.clone());
        Ok(row)
    }

    pub fn get(&self, id: u64) -> StoreResult<T> {
        self.check()?;
        self.rows.read().get(&id).cloned().ok_or_else(|| self.not_found(id))
    }

    /// All rows in id order
    pub fn all(&self) -> StoreResult<Vec<T>> {
        self.check()?;
        Ok(self.rows.read().values().cloned().collect())
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<Option<T>> {
        self.check()?;
        Ok(self.rows.read().values().find(|row| predicate(row)).cloned())
    }

    /// Apply `change` to one row and return the stored result
    pub fn update(&self, id: u64, change: impl FnOnce(&mut T) -> StoreResult<()>) -> StoreResult<T> {
        self.check()?;
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or_else(|| self.not_found(id))?;
        change(row)?;
        Ok(row.clone())
    }

    pub fn remove(&self, id: u64) -> StoreResult<T> {
        self.check()?;
        self.rows.write().remove(&id).ok_or_else(|| self.not_found(id))
    }

    /// Run `f` with exclusive access to every row
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<u64, T>, &dyn Fn() -> u64) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.check()?;
        let mut rows = self.rows.write();
        let next_id = || self.next_id.fetch_add(1, Ordering::SeqCst);
        f(&mut rows, &next_id)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u64,
        name: String,
    }

    fn store() -> MemoryStore<Row> {
        MemoryStore::new("Row")
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let store = store();
        let a = store.insert_with(|id| Row { id, name: "a".into() }).unwrap();
        let b = store.insert_with(|id| Row { id, name: "b".into() }).unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.all().unwrap(), vec![a, b]);
        assert_eq!(store.entity(), "Row");
    }

    #[test]
    fn test_missing_rows() {
        let store = store();
        assert_eq!(store.get(9), Err(StoreError::NotFound { entity: "Row", id: 9 }));
        assert!(store.remove(9).is_err());
        assert!(store.update(9, |_| Ok(())).is_err());
    }

    #[test]
    fn test_failed_update_leaves_row() {
        let store = store();
        let row = store.insert_with(|id| Row { id, name: "a".into() }).unwrap();

        let err = store
            .update(row.id, |_| Err(StoreError::Invalid("nope".into())))
            .unwrap_err();
        assert_eq!(err, StoreError::Invalid("nope".into()));
        assert_eq!(store.get(row.id).unwrap(), row);
    }

    #[test]
    fn test_transaction_allocates_ids() {
        let store = store();
        let id = store
            .transaction(|rows, next_id| {
                let id = next_id();
                rows.insert(id, Row { id, name: "t".into() });
                Ok(id)
            })
            .unwrap();

        assert_eq!(store.get(id).unwrap().name, "t");
        assert_eq!(store.insert_with(|id| Row { id, name: "u".into() }).unwrap().id, id + 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unavailable_store_fails_every_operation() {
        let store = store();
        let row = store.insert_with(|id| Row { id, name: "a".into() }).unwrap();
        store.set_available(false);

        let unavailable = StoreError::Unavailable { entity: "Row" };
        assert_eq!(store.get(row.id), Err(unavailable.clone()));
        assert_eq!(store.all(), Err(unavailable.clone()));
        assert_eq!(store.remove(row.id), Err(unavailable.clone()));
        assert!(store.insert_with(|id| Row { id, name: "b".into() }).is_err());

        let err: DomainError = unavailable.into();
        assert!(err.is(DomainError::UNAVAILABLE));

        store.set_available(true);
        assert_eq!(store.get(row.id).unwrap(), row);
    }

    #[test]
    fn test_error_kinds() {
        let err: DomainError = StoreError::NotFound { entity: "User", id: 3 }.into();
        assert_eq!(err, DomainError::not_found("User 3 not found"));

        let err: DomainError = StoreError::Conflict("taken".into()).into();
        assert!(err.is(DomainError::CONFLICT));
    }
}
