// SqlxAdapter: implementation of the core Adapter trait using sqlx::Any.
//
// Uses the `sqlx::any` driver to support Postgres and SQLite through a single
// runtime-polymorphic pool. Every operation is written once against the
// `Runner` trait, which both the pool-backed adapter and the
// transaction-scoped adapter implement.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{AnyPool, Column, Row};

use routemarket_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, SchemaOptions, SchemaStatus, TransactionAdapter,
    WhereClause,
};
use routemarket_core::db::schema::{FieldType, MarketSchema, TableSchema};
use routemarket_core::error::StoreError;
use routemarket_core::utils::generate_id;

use crate::query_builder::{self, BindValue};
use crate::schema::{self, DatabaseType};
use crate::transaction::SqlxTransactionAdapter;

/// SQLx-based storage adapter.
///
/// Wraps an `AnyPool` and implements the core `Adapter` trait.
#[derive(Debug, Clone)]
pub struct SqlxAdapter {
    pool: AnyPool,
    db_type: DatabaseType,
    schema: Arc<MarketSchema>,
}

impl SqlxAdapter {
    /// Create a new adapter from an existing pool.
    pub fn new(pool: AnyPool, db_type: DatabaseType) -> Self {
        Self {
            pool,
            db_type,
            schema: Arc::new(MarketSchema::marketplace()),
        }
    }

    /// Create a new adapter by connecting to a database URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        // Each connection to "sqlite::memory:" is a separate database, so keep
        // exactly one connection alive for the pool's lifetime.
        let pool = if url.contains(":memory:") || url.contains("mode=memory") {
            sqlx::any::AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await
        } else {
            AnyPool::connect(url).await
        }
        .map_err(|e| StoreError::Database(format!("database connection failed: {e}")))?;

        tracing::debug!(db_type = ?DatabaseType::from_url(url), "connected to database");
        Ok(Self::new(pool, DatabaseType::from_url(url)))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }
}

// ─── Row decoding ────────────────────────────────────────────────

/// Convert an `AnyRow` into a JSON object.
///
/// Columns declared in the table schema are decoded by their declared type
/// (SQLite hands booleans back as integers); anything else falls back to
/// trying the common types in turn.
pub(crate) fn row_to_json(row: &AnyRow, table: Option<&TableSchema>) -> serde_json::Value {
    let mut map = serde_json::Map::new();

    for col in row.columns() {
        let name = col.name();
        let declared = table.and_then(|t| t.fields.iter().find(|f| f.name == name)).map(|f| f.field_type);
        let value = match declared {
            Some(field_type) => decode_typed(row, name, field_type),
            None => decode_untyped(row, name),
        };
        map.insert(name.to_string(), value);
    }

    serde_json::Value::Object(map)
}

fn decode_typed(row: &AnyRow, name: &str, field_type: FieldType) -> serde_json::Value {
    use serde_json::Value;

    match field_type {
        FieldType::String | FieldType::Date => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        FieldType::Integer => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        FieldType::Number => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<Option<i64>, _>(name).ok().flatten().map(|v| v as f64))
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldType::Boolean => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<Option<i64>, _>(name).ok().flatten().map(|v| v != 0))
            .map(Value::Bool)
            .unwrap_or(Value::Null),
    }
}

fn decode_untyped(row: &AnyRow, name: &str) -> serde_json::Value {
    if let Ok(v) = row.try_get::<String, _>(name) {
        serde_json::Value::String(v)
    } else if let Ok(v) = row.try_get::<i64, _>(name) {
        serde_json::Value::Number(v.into())
    } else if let Ok(v) = row.try_get::<f64, _>(name) {
        serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Ok(v) = row.try_get::<bool, _>(name) {
        serde_json::Value::Bool(v)
    } else {
        // NULL or unsupported type
        serde_json::Value::Null
    }
}

// ─── Binding / execution ─────────────────────────────────────────

pub(crate) fn bind_all<'q>(
    sql: &'q str,
    binds: &'q [BindValue],
) -> Query<'q, sqlx::Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for bv in binds {
        query = match bv {
            BindValue::Text(s) => query.bind(s.as_str()),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Float(f) => query.bind(*f),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// Translate a driver error, recognising unique-constraint violations.
pub(crate) fn map_sqlx_error(model: &str, schema: &MarketSchema, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation {
                model: model.to_string(),
                fields: violated_columns(model, schema, db_err.constraint(), db_err.message()),
            };
        }
    }
    StoreError::Database(format!("query failed: {err}"))
}

/// Work out which columns a unique violation was about.
///
/// Postgres reports the constraint name; SQLite reports
/// `UNIQUE constraint failed: table.col, table.col`.
fn violated_columns(model: &str, schema: &MarketSchema, constraint: Option<&str>, message: &str) -> Vec<String> {
    if let (Some(name), Some(table)) = (constraint, schema.get(model)) {
        if let Some(columns) = table
            .unique
            .iter()
            .find(|cols| schema::constraint_name(model, cols) == name)
        {
            return columns.clone();
        }
    }
    message
        .split_once("failed:")
        .map(|(_, cols)| {
            cols.split(',')
                .map(|c| {
                    let c = c.trim();
                    c.rsplit_once('.').map(|(_, col)| col).unwrap_or(c).to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Something SQL can be run against: the pool, or an open transaction.
#[async_trait]
pub(crate) trait Runner: Send + Sync {
    fn db_type(&self) -> DatabaseType;

    fn schema(&self) -> &MarketSchema;

    async fn fetch_all(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<AnyRow>, sqlx::Error>;

    async fn fetch_optional(&self, sql: &str, binds: &[BindValue]) -> Result<Option<AnyRow>, sqlx::Error>;

    async fn execute(&self, sql: &str, binds: &[BindValue]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl Runner for SqlxAdapter {
    fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn schema(&self) -> &MarketSchema {
        &self.schema
    }

    async fn fetch_all(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<AnyRow>, sqlx::Error> {
        bind_all(sql, binds).fetch_all(&self.pool).await
    }

    async fn fetch_optional(&self, sql: &str, binds: &[BindValue]) -> Result<Option<AnyRow>, sqlx::Error> {
        bind_all(sql, binds).fetch_optional(&self.pool).await
    }

    async fn execute(&self, sql: &str, binds: &[BindValue]) -> Result<u64, sqlx::Error> {
        Ok(bind_all(sql, binds).execute(&self.pool).await?.rows_affected())
    }
}

// ─── Operations ──────────────────────────────────────────────────

pub(crate) mod ops {
    use super::*;

    fn select_by_id(model: &str, id: &str, table: Option<&TableSchema>) -> (String, Vec<BindValue>) {
        let where_frag = query_builder::build_where(&[WhereClause::eq("id", id)], 0, table);
        (
            format!("SELECT * FROM {}{}", query_builder::quote_identifier(model), where_frag.sql),
            where_frag.binds,
        )
    }

    pub async fn create<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let schema = runner.schema();
        let table = schema.get(model);

        let mut data = data;
        let obj = data
            .as_object_mut()
            .ok_or_else(|| StoreError::Serialization(format!("{model}: record must be a JSON object")))?;
        let id = match obj.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                let id = generate_id();
                obj.insert("id".to_string(), serde_json::Value::String(id.clone()));
                id
            }
        };

        let frag = query_builder::build_insert(model, &data, table);
        runner
            .execute(&frag.sql, &frag.binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;

        // No RETURNING through sqlx::Any; select the row back.
        let (sql, binds) = select_by_id(model, &id, table);
        let row = runner
            .fetch_optional(&sql, &binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?
            .ok_or_else(|| StoreError::Database(format!("{model}: select-back after insert failed")))?;
        Ok(row_to_json(&row, table))
    }

    pub async fn find_one<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let schema = runner.schema();
        let table = schema.get(model);
        let where_frag = query_builder::build_where(where_clauses, 0, table);
        let sql = format!(
            "SELECT * FROM {}{} LIMIT 1",
            query_builder::quote_identifier(model),
            where_frag.sql
        );
        let row = runner
            .fetch_optional(&sql, &where_frag.binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;
        Ok(row.as_ref().map(|r| row_to_json(r, table)))
    }

    pub async fn find_many<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let schema = runner.schema();
        let table = schema.get(model);
        let where_frag = query_builder::build_where(&query.where_clauses, 0, table);
        let sql = format!(
            "SELECT * FROM {}{}{}{}",
            query_builder::quote_identifier(model),
            where_frag.sql,
            query_builder::build_order_by(&query),
            query_builder::build_limit_offset(&query, runner.db_type())
        );
        let rows = runner
            .fetch_all(&sql, &where_frag.binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;
        Ok(rows.iter().map(|r| row_to_json(r, table)).collect())
    }

    pub async fn count<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64> {
        let schema = runner.schema();
        let where_frag = query_builder::build_where(where_clauses, 0, schema.get(model));
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}{}",
            query_builder::quote_identifier(model),
            where_frag.sql
        );
        let row = runner
            .fetch_optional(&sql, &where_frag.binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?
            .ok_or_else(|| StoreError::Database("count returned no rows".into()))?;
        row.try_get::<i64, _>("count")
            .map_err(|e| StoreError::Database(format!("count decode failed: {e}")))
    }

    pub async fn update<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let schema = runner.schema();
        let table = schema.get(model);

        // Only the first match is updated; pin it by id.
        let Some(current) = find_one(runner, model, where_clauses).await? else {
            return Ok(None);
        };
        let id = current
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Database(format!("{model}: row without id")))?
            .to_string();

        let set_frag = query_builder::build_update_set(&data, 0, table);
        if set_frag.sql.is_empty() {
            return Ok(Some(current));
        }
        let where_frag = query_builder::build_where(&[WhereClause::eq("id", id.as_str())], set_frag.binds.len(), table);
        let sql = format!(
            "UPDATE {} SET {}{}",
            query_builder::quote_identifier(model),
            set_frag.sql,
            where_frag.sql
        );
        let mut binds = set_frag.binds;
        binds.extend(where_frag.binds);
        runner
            .execute(&sql, &binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;

        let (sql, binds) = select_by_id(model, &id, table);
        let row = runner
            .fetch_optional(&sql, &binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;
        Ok(row.as_ref().map(|r| row_to_json(r, table)))
    }

    pub async fn delete_many<R: Runner + ?Sized>(
        runner: &R,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64> {
        let schema = runner.schema();
        let where_frag = query_builder::build_where(where_clauses, 0, schema.get(model));
        let sql = format!(
            "DELETE FROM {}{}",
            query_builder::quote_identifier(model),
            where_frag.sql
        );
        let affected = runner
            .execute(&sql, &where_frag.binds)
            .await
            .map_err(|e| map_sqlx_error(model, schema, e))?;
        Ok(affected as i64)
    }
}

#[async_trait]
impl Adapter for SqlxAdapter {
    async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
        ops::create(self, model, data).await
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        ops::find_one(self, model, where_clauses).await
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<serde_json::Value>> {
        ops::find_many(self, model, query).await
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        ops::count(self, model, where_clauses).await
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        ops::update(self, model, where_clauses, data).await
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        ops::delete_many(self, model, where_clauses).await
    }

    async fn create_schema(&self, schema: &MarketSchema, options: &SchemaOptions) -> AdapterResult<SchemaStatus> {
        schema::create_schema(&self.pool, schema, self.db_type, options).await
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(format!("transaction begin failed: {e}")))?;
        Ok(Box::new(SqlxTransactionAdapter::new(tx, self.db_type, self.schema.clone())))
    }
}
