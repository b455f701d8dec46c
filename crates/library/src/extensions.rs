//! Typed record access inside a unit of work
//!
//! Services never touch `Value` directly. They go through these methods,
//! which turn keys into records and index rows into ids and report missing
//! records as `NotFound` with the entity's name.
//!
//! ```rust,ignore
//! use folio_library::RecordTxnExt;
//!
//! db.transaction_with_retry(|txn| {
//!     let mut book: Book = txn.require(book_id)?;
//!     book.stock += 1;
//!     txn.put_record(book)
//! })?;
//! ```

use folio_concurrency::TransactionContext;
use folio_core::{Key, LibraryError, LibraryResult, Record, Value};

/// Record-level operations on a [`TransactionContext`]
pub trait RecordTxnExt {
    /// Read a record, `None` if absent
    fn fetch<R: Record>(&mut self, id: R::Id) -> LibraryResult<Option<R>>;

    /// Read a record, `NotFound` if absent
    fn require<R: Record>(&mut self, id: R::Id) -> LibraryResult<R>;

    /// Buffer a write of a record under its own key
    fn put_record<R: Record>(&mut self, record: R) -> LibraryResult<()>;

    /// Buffer a delete of a record
    fn delete_record<R: Record>(&mut self, id: R::Id) -> LibraryResult<()>;

    /// Every record of a family, in id order
    fn scan_records<R: Record>(&mut self) -> LibraryResult<Vec<R>>;

    /// Target id of an index row
    fn get_ref(&mut self, key: &Key) -> LibraryResult<Option<u64>>;

    /// Buffer an index row pointing at `id`
    fn put_ref(&mut self, key: Key, id: u64) -> LibraryResult<()>;

    /// Target ids of every index row under `prefix`, in key order
    fn scan_refs(&mut self, prefix: &Key) -> LibraryResult<Vec<u64>>;
}

fn expect_ref(key: &Key, value: Value) -> LibraryResult<u64> {
    value.as_ref_id().ok_or_else(|| {
        LibraryError::internal(format!(
            "index row {key} holds a {} record",
            value.kind()
        ))
    })
}

impl RecordTxnExt for TransactionContext {
    fn fetch<R: Record>(&mut self, id: R::Id) -> LibraryResult<Option<R>> {
        self.get(&R::key_for(id))?.map(R::from_value).transpose()
    }

    fn require<R: Record>(&mut self, id: R::Id) -> LibraryResult<R> {
        self.fetch::<R>(id)?
            .ok_or_else(|| LibraryError::not_found(R::ENTITY, id))
    }

    fn put_record<R: Record>(&mut self, record: R) -> LibraryResult<()> {
        let key = record.key();
        self.put(key, record.into_value())
    }

    fn delete_record<R: Record>(&mut self, id: R::Id) -> LibraryResult<()> {
        self.delete(R::key_for(id))
    }

    fn scan_records<R: Record>(&mut self) -> LibraryResult<Vec<R>> {
        self.scan_prefix(&Key::prefix(R::TYPE_TAG))?
            .into_iter()
            .map(|(_, value)| R::from_value(value))
            .collect()
    }

    fn get_ref(&mut self, key: &Key) -> LibraryResult<Option<u64>> {
        self.get(key)?.map(|v| expect_ref(key, v)).transpose()
    }

    fn put_ref(&mut self, key: Key, id: u64) -> LibraryResult<()> {
        self.put(key, Value::Ref(id))
    }

    fn scan_refs(&mut self, prefix: &Key) -> LibraryResult<Vec<u64>> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(key, value)| expect_ref(&key, value))
            .collect()
    }
}
