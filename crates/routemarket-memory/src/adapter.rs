// In-memory storage adapter: HashMap-based store implementing the core Adapter trait.
//
// Stores data in `HashMap<String, Vec<serde_json::Value>>` keyed by table name.
// Unique constraints from the `MarketSchema` are checked under the same write
// lock as the insert/update they guard, so concurrent writers cannot both pass.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use routemarket_core::db::adapter::{
    Adapter, AdapterResult, Connector, FindManyQuery, Operator, SchemaOptions, SchemaStatus,
    SortDirection, TransactionAdapter, WhereClause,
};
use routemarket_core::db::schema::MarketSchema;
use routemarket_core::error::StoreError;
use routemarket_core::utils::generate_id;

/// Type alias for the in-memory store.
type Store = HashMap<String, Vec<serde_json::Value>>;

/// Unique constraints per table: each entry is a column set.
type Constraints = HashMap<String, Vec<Vec<String>>>;

/// In-memory storage adapter.
///
/// Cloning is cheap and clones share the same data. Data is lost when the
/// last clone is dropped.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Store>>,
    constraints: Arc<RwLock<Constraints>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Create an empty adapter enforcing the marketplace schema's constraints.
    pub fn new() -> Self {
        Self::with_schema(&MarketSchema::marketplace())
    }

    /// Create an empty adapter enforcing the constraints of `schema`.
    pub fn with_schema(schema: &MarketSchema) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            constraints: Arc::new(RwLock::new(constraints_of(schema))),
        }
    }

    // Copied out so the constraints lock is never held while waiting on the store lock.
    async fn constraint_snapshot(&self) -> Constraints {
        self.constraints.read().await.clone()
    }

    /// Get a snapshot of all data (for debugging/testing).
    pub async fn snapshot(&self) -> Store {
        self.store.read().await.clone()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Get record count for a specific table.
    pub async fn model_count(&self, model: &str) -> usize {
        self.store
            .read()
            .await
            .get(model)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

fn constraints_of(schema: &MarketSchema) -> Constraints {
    schema
        .tables
        .iter()
        .map(|t| (t.name.clone(), t.unique.clone()))
        .collect()
}

// ─── Matching ────────────────────────────────────────────────────

/// Check if a record matches a set of WHERE clauses.
fn matches_where(record: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    if clauses.is_empty() {
        return true;
    }

    let mut result = true;
    let mut pending_or = false;

    for clause in clauses {
        let field_val = record.get(&clause.field).cloned().unwrap_or(serde_json::Value::Null);
        let clause_match = match_operator(&field_val, &clause.value, &clause.operator);

        if pending_or {
            result = result || clause_match;
        } else {
            result = result && clause_match;
        }

        pending_or = matches!(clause.connector, Some(Connector::Or));
    }

    result
}

fn match_operator(field_val: &serde_json::Value, target: &serde_json::Value, op: &Operator) -> bool {
    use std::cmp::Ordering;

    match op {
        Operator::Eq => json_eq(field_val, target),
        Operator::Ne => !json_eq(field_val, target),
        Operator::Lt => compare_json(field_val, target) == Some(Ordering::Less),
        Operator::Lte => matches!(compare_json(field_val, target), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare_json(field_val, target) == Some(Ordering::Greater),
        Operator::Gte => matches!(compare_json(field_val, target), Some(Ordering::Greater | Ordering::Equal)),
        Operator::In => match target {
            serde_json::Value::Array(arr) => arr.iter().any(|v| json_eq(field_val, v)),
            _ => false,
        },
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn json_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => an.as_f64() == bn.as_f64(),
        _ => a == b,
    }
}

/// Compare two JSON values numerically or lexicographically.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            an.as_f64()?.partial_cmp(&bn.as_f64()?)
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => Some(a_s.cmp(b_s)),
        (serde_json::Value::Bool(a_b), serde_json::Value::Bool(b_b)) => Some(a_b.cmp(b_b)),
        _ => None,
    }
}

fn sort_records(records: &mut [serde_json::Value], query: &FindManyQuery) {
    use std::cmp::Ordering;

    if let Some(ref sort) = query.sort_by {
        records.sort_by(|a, b| {
            let cmp = match (a.get(&sort.field), b.get(&sort.field)) {
                (Some(av), Some(bv)) => compare_json(av, bv).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            match sort.direction {
                SortDirection::Asc => cmp,
                SortDirection::Desc => cmp.reverse(),
            }
        });
    }
}

fn merge_update(record: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

// ─── Unique constraints ──────────────────────────────────────────

/// Values of `columns` in `record`, or `None` if any is null/missing.
/// Rows with a null in a constrained column never collide, as in SQL.
fn constraint_key<'a>(record: &'a serde_json::Value, columns: &[String]) -> Option<Vec<&'a serde_json::Value>> {
    columns
        .iter()
        .map(|c| record.get(c).filter(|v| !v.is_null()))
        .collect()
}

/// Find the first constraint `candidate` would violate against `rows`,
/// ignoring the row at index `skip` (the row being updated).
fn check_unique(
    model: &str,
    rows: &[serde_json::Value],
    candidate: &serde_json::Value,
    constraints: &[Vec<String>],
    skip: Option<usize>,
) -> AdapterResult<()> {
    let id_constraint = vec!["id".to_string()];
    for columns in std::iter::once(&id_constraint).chain(constraints.iter()) {
        let Some(key) = constraint_key(candidate, columns) else {
            continue;
        };
        let clash = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip
                && constraint_key(row, columns).is_some_and(|other| {
                    other.iter().zip(key.iter()).all(|(a, b)| json_eq(a, b))
                })
        });
        if clash {
            return Err(StoreError::UniqueViolation {
                model: model.to_string(),
                fields: columns.clone(),
            });
        }
    }
    Ok(())
}

// ─── Table operations ────────────────────────────────────────────
//
// Shared by `MemoryAdapter` (on the live store) and `MemoryTransactionAdapter`
// (on its working copy).

fn insert_record(
    store: &mut Store,
    constraints: &Constraints,
    model: &str,
    data: serde_json::Value,
) -> AdapterResult<serde_json::Value> {
    let mut record = data;
    let obj = record
        .as_object_mut()
        .ok_or_else(|| StoreError::Serialization(format!("{model}: record must be a JSON object")))?;
    if obj.get("id").map_or(true, |v| v.is_null()) {
        obj.insert("id".to_string(), serde_json::Value::String(generate_id()));
    }

    let rows = store.entry(model.to_string()).or_default();
    let table_constraints = constraints.get(model).map(Vec::as_slice).unwrap_or(&[]);
    check_unique(model, rows, &record, table_constraints, None)?;
    rows.push(record.clone());
    Ok(record)
}

fn find_one_in(store: &Store, model: &str, where_clauses: &[WhereClause]) -> Option<serde_json::Value> {
    store
        .get(model)
        .and_then(|recs| recs.iter().find(|r| matches_where(r, where_clauses)).cloned())
}

fn find_many_in(store: &Store, model: &str, query: &FindManyQuery) -> Vec<serde_json::Value> {
    let mut result: Vec<serde_json::Value> = store
        .get(model)
        .map(|recs| {
            recs.iter()
                .filter(|r| matches_where(r, &query.where_clauses))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    sort_records(&mut result, query);

    let offset = query.offset.unwrap_or(0).max(0) as usize;
    let iter = result.into_iter().skip(offset);
    match query.limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

fn count_in(store: &Store, model: &str, where_clauses: &[WhereClause]) -> i64 {
    store
        .get(model)
        .map(|recs| recs.iter().filter(|r| matches_where(r, where_clauses)).count())
        .unwrap_or(0) as i64
}

fn update_in(
    store: &mut Store,
    constraints: &Constraints,
    model: &str,
    where_clauses: &[WhereClause],
    data: &serde_json::Value,
) -> AdapterResult<Option<serde_json::Value>> {
    let Some(rows) = store.get_mut(model) else {
        return Ok(None);
    };
    let Some(pos) = rows.iter().position(|r| matches_where(r, where_clauses)) else {
        return Ok(None);
    };

    let mut updated = rows[pos].clone();
    merge_update(&mut updated, data);
    let table_constraints = constraints.get(model).map(Vec::as_slice).unwrap_or(&[]);
    check_unique(model, rows, &updated, table_constraints, Some(pos))?;
    rows[pos] = updated.clone();
    Ok(Some(updated))
}

fn delete_many_in(store: &mut Store, model: &str, where_clauses: &[WhereClause]) -> i64 {
    match store.get_mut(model) {
        Some(recs) => {
            let before = recs.len();
            recs.retain(|r| !matches_where(r, where_clauses));
            (before - recs.len()) as i64
        }
        None => 0,
    }
}

// ─── Adapter ─────────────────────────────────────────────────────

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
        let constraints = self.constraint_snapshot().await;
        let mut store = self.store.write().await;
        insert_record(&mut store, &constraints, model, data)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.store.read().await;
        Ok(find_one_in(&store, model, where_clauses))
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.store.read().await;
        Ok(find_many_in(&store, model, &query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.store.read().await;
        Ok(count_in(&store, model, where_clauses))
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let constraints = self.constraint_snapshot().await;
        let mut store = self.store.write().await;
        update_in(&mut store, &constraints, model, where_clauses, &data)
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        Ok(delete_many_in(&mut store, model, where_clauses))
    }

    async fn create_schema(&self, schema: &MarketSchema, _options: &SchemaOptions) -> AdapterResult<SchemaStatus> {
        // No tables to create; adopt the schema's unique constraints.
        let mut constraints = self.constraints.write().await;
        constraints.extend(constraints_of(schema));
        Ok(SchemaStatus::UpToDate)
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        // The transaction owns the write lock until commit/rollback/drop, so
        // its working copy cannot go stale.
        let constraints = self.constraint_snapshot().await;
        let guard = self.store.clone().write_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransactionAdapter {
            guard: Mutex::new(Some(guard)),
            working: Mutex::new(working),
            constraints,
        }))
    }
}

// ─── Transaction Adapter ─────────────────────────────────────────

/// In-memory transaction adapter.
///
/// Holds the store's write lock for its whole lifetime and runs every
/// operation against a working copy. Commit swaps the copy in; rollback or
/// drop discards it.
struct MemoryTransactionAdapter {
    guard: Mutex<Option<OwnedRwLockWriteGuard<Store>>>,
    working: Mutex<Store>,
    constraints: Constraints,
}

impl std::fmt::Debug for MemoryTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransactionAdapter").finish()
    }
}

#[async_trait]
impl Adapter for MemoryTransactionAdapter {
    async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
        let mut store = self.working.lock().await;
        insert_record(&mut store, &self.constraints, model, data)
    }

    async fn find_one(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.working.lock().await;
        Ok(find_one_in(&store, model, where_clauses))
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.working.lock().await;
        Ok(find_many_in(&store, model, &query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.working.lock().await;
        Ok(count_in(&store, model, where_clauses))
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let mut store = self.working.lock().await;
        update_in(&mut store, &self.constraints, model, where_clauses, &data)
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let mut store = self.working.lock().await;
        Ok(delete_many_in(&mut store, model, where_clauses))
    }

    async fn create_schema(&self, _schema: &MarketSchema, _options: &SchemaOptions) -> AdapterResult<SchemaStatus> {
        Err(StoreError::Transaction("schema changes are not supported inside a transaction".into()))
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(StoreError::Transaction("nested transactions are not supported in the memory adapter".into()))
    }
}

#[async_trait]
impl TransactionAdapter for MemoryTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let mut guard = self
            .guard
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::Transaction("transaction already finished".into()))?;
        let working = std::mem::take(&mut *self.working.lock().await);
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        // Dropping the guard releases the lock; the working copy is discarded.
        self.guard.lock().await.take();
        Ok(())
    }
}
