//! Local document store contract.
//!
//! The engine reads and writes soups through this narrow trait; the
//! storage engine behind it (indexing, query planning, durability) is
//! someone else's concern. [`MemoryLocalStore`] is the in-crate double
//! used by the engine's own tests.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Type of an indexed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// String values.
    String,
    /// Integer values.
    Integer,
    /// Floating-point values.
    Floating,
}

/// One indexed path of a soup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Dotted path into the record.
    pub path: String,
    /// Declared value type.
    pub index_type: IndexType,
}

impl IndexSpec {
    /// Creates a string index spec.
    pub fn string(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            index_type: IndexType::String,
        }
    }

    /// Creates an integer index spec.
    pub fn integer(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            index_type: IndexType::Integer,
        }
    }

    /// Creates a floating-point index spec.
    pub fn floating(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            index_type: IndexType::Floating,
        }
    }
}

/// Declarative filter over a soup's indexed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Every record in the soup.
    All,
    /// Records whose value at the path equals the given value.
    Exact(Value),
    /// Records whose value at the path lies in `[min, max]`.
    Range {
        /// Inclusive lower bound.
        min: Value,
        /// Inclusive upper bound.
        max: Value,
    },
}

/// A store query: soup, optional path, filter, page size.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Soup to query.
    pub soup_name: String,
    /// Path the filter applies to; `None` for [`QueryFilter::All`].
    pub path: Option<String>,
    /// The filter.
    pub filter: QueryFilter,
    /// Records per page.
    pub page_size: u32,
}

impl QuerySpec {
    /// Builds an all-records query.
    pub fn all(soup_name: impl Into<String>, page_size: u32) -> Self {
        Self {
            soup_name: soup_name.into(),
            path: None,
            filter: QueryFilter::All,
            page_size,
        }
    }

    /// Builds an exact-match query.
    pub fn exact(
        soup_name: impl Into<String>,
        path: impl Into<String>,
        value: Value,
        page_size: u32,
    ) -> Self {
        Self {
            soup_name: soup_name.into(),
            path: Some(path.into()),
            filter: QueryFilter::Exact(value),
            page_size,
        }
    }

    /// Builds a range query.
    pub fn range(
        soup_name: impl Into<String>,
        path: impl Into<String>,
        min: Value,
        max: Value,
        page_size: u32,
    ) -> Self {
        Self {
            soup_name: soup_name.into(),
            path: Some(path.into()),
            filter: QueryFilter::Range { min, max },
            page_size,
        }
    }
}

/// The local document store the engine mutates.
///
/// All writes performed while a sync applies a page (sync-down) or a batch
/// (sync-up) are wrapped in `begin_transaction`/`commit_transaction`.
pub trait LocalStore: Send + Sync {
    /// Returns true if the soup exists.
    fn has_soup(&self, soup_name: &str) -> bool;

    /// Registers a soup with the given indexed paths. Registering an
    /// existing soup keeps its data.
    fn register_soup(&self, soup_name: &str, index_specs: &[IndexSpec]) -> StoreResult<()>;

    /// Runs a query and returns the records of the given page, in the
    /// store's natural (entry id) order.
    fn query(&self, spec: &QuerySpec, page_index: u32) -> StoreResult<Vec<Value>>;

    /// Inserts or replaces a record, matched by the value at
    /// `match_field`. Returns the stored record including its
    /// `_soupEntryId`.
    fn upsert(&self, soup_name: &str, record: Value, match_field: &str) -> StoreResult<Value>;

    /// Replaces the record at an existing entry id.
    fn update(&self, soup_name: &str, record: Value, entry_id: i64) -> StoreResult<Value>;

    /// Removes the entries with the given ids. Missing ids are ignored.
    fn delete(&self, soup_name: &str, entry_ids: &[i64]) -> StoreResult<()>;

    /// Opens a transaction. Transactions do not nest.
    fn begin_transaction(&self);

    /// Commits the open transaction.
    fn commit_transaction(&self);
}

/// Reads a dotted path out of a record.
pub fn path_value<'v>(record: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(record, |value, key| value.get(key))
}

fn values_cmp(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => left
            .as_f64()
            .zip(right.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn matches(record: &Value, spec: &QuerySpec) -> bool {
    match &spec.filter {
        QueryFilter::All => true,
        QueryFilter::Exact(expected) => {
            let path = spec.path.as_deref().unwrap_or_default();
            path_value(record, path) == Some(expected)
        }
        QueryFilter::Range { min, max } => {
            let path = spec.path.as_deref().unwrap_or_default();
            let Some(value) = path_value(record, path) else {
                return false;
            };
            let ge_min = values_cmp(value, min).is_some_and(|o| o.is_ge());
            let le_max = values_cmp(value, max).is_some_and(|o| o.is_le());
            ge_min && le_max
        }
    }
}

struct SoupData {
    index_specs: Vec<IndexSpec>,
    entries: BTreeMap<i64, Value>,
    next_entry_id: i64,
}

impl SoupData {
    fn new(index_specs: Vec<IndexSpec>) -> Self {
        Self {
            index_specs,
            entries: BTreeMap::new(),
            next_entry_id: 1,
        }
    }
}

/// An in-memory store for tests.
///
/// Entry ids are assigned from a per-soup counter; queries iterate in
/// entry-id order. Transactions are tracked but not rolled back; the
/// engine never rolls back, it only brackets its writes.
#[derive(Default)]
pub struct MemoryLocalStore {
    soups: RwLock<HashMap<String, SoupData>>,
    txn_depth: RwLock<u32>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many records the soup holds.
    pub fn count(&self, soup_name: &str) -> usize {
        self.soups
            .read()
            .get(soup_name)
            .map(|soup| soup.entries.len())
            .unwrap_or(0)
    }

    /// Returns true while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        *self.txn_depth.read() > 0
    }

    /// Returns the declared index specs of a soup.
    pub fn index_specs(&self, soup_name: &str) -> Vec<IndexSpec> {
        self.soups
            .read()
            .get(soup_name)
            .map(|soup| soup.index_specs.clone())
            .unwrap_or_default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn has_soup(&self, soup_name: &str) -> bool {
        self.soups.read().contains_key(soup_name)
    }

    fn register_soup(&self, soup_name: &str, index_specs: &[IndexSpec]) -> StoreResult<()> {
        self.soups
            .write()
            .entry(soup_name.to_string())
            .or_insert_with(|| SoupData::new(index_specs.to_vec()));
        Ok(())
    }

    fn query(&self, spec: &QuerySpec, page_index: u32) -> StoreResult<Vec<Value>> {
        let soups = self.soups.read();
        let soup = soups
            .get(&spec.soup_name)
            .ok_or_else(|| StoreError::SoupNotFound(spec.soup_name.clone()))?;

        let page_size = spec.page_size as usize;
        let skip = page_size.saturating_mul(page_index as usize);
        Ok(soup
            .entries
            .values()
            .filter(|record| matches(record, spec))
            .skip(skip)
            .take(page_size)
            .cloned()
            .collect())
    }

    fn upsert(&self, soup_name: &str, mut record: Value, match_field: &str) -> StoreResult<Value> {
        if !record.is_object() {
            return Err(StoreError::InvalidRecord("record must be an object".into()));
        }

        let mut soups = self.soups.write();
        let soup = soups
            .get_mut(soup_name)
            .ok_or_else(|| StoreError::SoupNotFound(soup_name.to_string()))?;

        let matched_id = path_value(&record, match_field)
            .filter(|v| !v.is_null())
            .cloned()
            .and_then(|needle| {
                soup.entries
                    .iter()
                    .find(|(_, existing)| path_value(existing, match_field) == Some(&needle))
                    .map(|(id, _)| *id)
            });

        let entry_id = matched_id.unwrap_or_else(|| {
            let id = soup.next_entry_id;
            soup.next_entry_id += 1;
            id
        });

        if let Some(map) = record.as_object_mut() {
            map.insert("_soupEntryId".into(), json!(entry_id));
        }
        soup.entries.insert(entry_id, record.clone());
        Ok(record)
    }

    fn update(&self, soup_name: &str, mut record: Value, entry_id: i64) -> StoreResult<Value> {
        if !record.is_object() {
            return Err(StoreError::InvalidRecord("record must be an object".into()));
        }

        let mut soups = self.soups.write();
        let soup = soups
            .get_mut(soup_name)
            .ok_or_else(|| StoreError::SoupNotFound(soup_name.to_string()))?;

        if !soup.entries.contains_key(&entry_id) {
            return Err(StoreError::EntryNotFound {
                soup: soup_name.to_string(),
                entry_id,
            });
        }

        if let Some(map) = record.as_object_mut() {
            map.insert("_soupEntryId".into(), json!(entry_id));
        }
        soup.entries.insert(entry_id, record.clone());
        Ok(record)
    }

    fn delete(&self, soup_name: &str, entry_ids: &[i64]) -> StoreResult<()> {
        let mut soups = self.soups.write();
        let soup = soups
            .get_mut(soup_name)
            .ok_or_else(|| StoreError::SoupNotFound(soup_name.to_string()))?;

        for entry_id in entry_ids {
            soup.entries.remove(entry_id);
        }
        Ok(())
    }

    fn begin_transaction(&self) {
        *self.txn_depth.write() += 1;
    }

    fn commit_transaction(&self) {
        let mut depth = self.txn_depth.write();
        *depth = depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_soup(soup: &str) -> MemoryLocalStore {
        let store = MemoryLocalStore::new();
        store
            .register_soup(soup, &[IndexSpec::string("Id")])
            .unwrap();
        store
    }

    #[test]
    fn register_is_idempotent() {
        let store = store_with_soup("accounts");
        store
            .upsert("accounts", json!({"Id": "001"}), "Id")
            .unwrap();
        store
            .register_soup("accounts", &[IndexSpec::string("Id")])
            .unwrap();
        assert_eq!(store.count("accounts"), 1);
    }

    #[test]
    fn upsert_assigns_and_reuses_entry_ids() {
        let store = store_with_soup("accounts");

        let first = store
            .upsert("accounts", json!({"Id": "001", "Name": "Acme"}), "Id")
            .unwrap();
        let entry_id = first["_soupEntryId"].as_i64().unwrap();

        let second = store
            .upsert("accounts", json!({"Id": "001", "Name": "Acme 2"}), "Id")
            .unwrap();
        assert_eq!(second["_soupEntryId"].as_i64().unwrap(), entry_id);
        assert_eq!(store.count("accounts"), 1);

        let third = store
            .upsert("accounts", json!({"Id": "002", "Name": "Other"}), "Id")
            .unwrap();
        assert_ne!(third["_soupEntryId"].as_i64().unwrap(), entry_id);
        assert_eq!(store.count("accounts"), 2);
    }

    #[test]
    fn upsert_without_match_value_inserts() {
        let store = store_with_soup("accounts");
        store.upsert("accounts", json!({"Name": "A"}), "Id").unwrap();
        store.upsert("accounts", json!({"Name": "B"}), "Id").unwrap();
        assert_eq!(store.count("accounts"), 2);
    }

    #[test]
    fn exact_query_pages_in_entry_order() {
        let store = store_with_soup("accounts");
        for i in 0..5 {
            store
                .upsert(
                    "accounts",
                    json!({"Id": format!("00{i}"), "Dirty": i % 2 == 0}),
                    "Id",
                )
                .unwrap();
        }

        let spec = QuerySpec::exact("accounts", "Dirty", json!(true), 2);
        let page0 = store.query(&spec, 0).unwrap();
        let page1 = store.query(&spec, 1).unwrap();

        assert_eq!(page0.len(), 2);
        assert_eq!(page0[0]["Id"], "000");
        assert_eq!(page0[1]["Id"], "002");
        assert_eq!(page1.len(), 1);
        assert_eq!(page1[0]["Id"], "004");
    }

    #[test]
    fn range_query_over_integers() {
        let store = store_with_soup("accounts");
        for i in 0..5 {
            store
                .upsert("accounts", json!({"Id": format!("{i}"), "N": i}), "Id")
                .unwrap();
        }

        let spec = QuerySpec::range("accounts", "N", json!(1), json!(3), 10);
        let hits = store.query(&spec, 0).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn nested_path_lookup() {
        let record = json!({"attributes": {"type": "Account"}});
        assert_eq!(
            path_value(&record, "attributes.type"),
            Some(&json!("Account"))
        );
        assert_eq!(path_value(&record, "attributes.missing"), None);
    }

    #[test]
    fn update_requires_existing_entry() {
        let store = store_with_soup("accounts");
        let err = store
            .update("accounts", json!({"Id": "001"}), 99)
            .unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound { .. }));
    }

    #[test]
    fn delete_ignores_missing_ids() {
        let store = store_with_soup("accounts");
        let stored = store
            .upsert("accounts", json!({"Id": "001"}), "Id")
            .unwrap();
        let entry_id = stored["_soupEntryId"].as_i64().unwrap();

        store.delete("accounts", &[entry_id, 12345]).unwrap();
        assert_eq!(store.count("accounts"), 0);
    }

    #[test]
    fn unregistered_soup_is_an_error() {
        let store = MemoryLocalStore::new();
        let err = store
            .query(&QuerySpec::all("nope", 10), 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::SoupNotFound(_)));
    }

    #[test]
    fn transaction_depth_tracking() {
        let store = MemoryLocalStore::new();
        assert!(!store.in_transaction());
        store.begin_transaction();
        assert!(store.in_transaction());
        store.commit_transaction();
        assert!(!store.in_transaction());
        store.commit_transaction();
        assert!(!store.in_transaction());
    }
}
