// Transaction adapter: wraps sqlx::Transaction to implement Adapter + TransactionAdapter.
//
// Uses tokio::sync::Mutex to hold the transaction across async boundaries.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use tokio::sync::Mutex;

use routemarket_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, SchemaOptions, SchemaStatus, TransactionAdapter,
    WhereClause,
};
use routemarket_core::db::schema::MarketSchema;
use routemarket_core::error::StoreError;

use crate::adapter::{bind_all, ops, Runner};
use crate::query_builder::BindValue;
use crate::schema::DatabaseType;

/// Transaction-scoped adapter.
///
/// Every operation runs inside the wrapped `sqlx::Transaction`. Dropping the
/// adapter without committing rolls the transaction back.
pub struct SqlxTransactionAdapter {
    tx: Mutex<Option<sqlx::Transaction<'static, sqlx::Any>>>,
    db_type: DatabaseType,
    schema: Arc<MarketSchema>,
}

impl std::fmt::Debug for SqlxTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxTransactionAdapter")
            .field("db_type", &self.db_type)
            .finish()
    }
}

impl SqlxTransactionAdapter {
    pub fn new(tx: sqlx::Transaction<'static, sqlx::Any>, db_type: DatabaseType, schema: Arc<MarketSchema>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            db_type,
            schema,
        }
    }

    fn take(self: Box<Self>) -> AdapterResult<sqlx::Transaction<'static, sqlx::Any>> {
        self.tx
            .into_inner()
            .ok_or_else(|| StoreError::Transaction("transaction already consumed".into()))
    }
}

fn consumed() -> sqlx::Error {
    sqlx::Error::Protocol("transaction already consumed".into())
}

#[async_trait]
impl Runner for SqlxTransactionAdapter {
    fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn schema(&self) -> &MarketSchema {
        &self.schema
    }

    async fn fetch_all(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<AnyRow>, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(consumed)?;
        bind_all(sql, binds).fetch_all(&mut **tx).await
    }

    async fn fetch_optional(&self, sql: &str, binds: &[BindValue]) -> Result<Option<AnyRow>, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(consumed)?;
        bind_all(sql, binds).fetch_optional(&mut **tx).await
    }

    async fn execute(&self, sql: &str, binds: &[BindValue]) -> Result<u64, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(consumed)?;
        Ok(bind_all(sql, binds).execute(&mut **tx).await?.rows_affected())
    }
}

#[async_trait]
impl Adapter for SqlxTransactionAdapter {
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

    async fn create_schema(&self, _schema: &MarketSchema, _options: &SchemaOptions) -> AdapterResult<SchemaStatus> {
        Err(StoreError::Transaction("create_schema is not supported inside a transaction".into()))
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(StoreError::Transaction("nested transactions are not supported".into()))
    }
}

#[async_trait]
impl TransactionAdapter for SqlxTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        self.take()?
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        self.take()?
            .rollback()
            .await
            .map_err(|e| StoreError::Transaction(format!("rollback failed: {e}")))
    }
}
