// Storage adapter trait: the abstraction every backend implements.
//
// Records travel as `serde_json::Value` objects keyed by camelCase column
// names; the typed `MarketStore` in the `routemarket` crate converts between
// these values and the models in `db::models`.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::schema::MarketSchema;
use crate::error::StoreError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, StoreError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for WHERE clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Value is in the given list.
    In,
}

/// A single WHERE condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    /// The field name to filter on.
    pub field: String,
    /// The comparison value.
    pub value: serde_json::Value,
    /// The comparison operator (default: Eq).
    #[serde(default)]
    pub operator: Operator,
    /// Connector to the next clause. None means this is the last/only clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

/// Logical connector between WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl WhereClause {
    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, Operator::Eq, value)
    }

    /// Filter with an explicit operator.
    pub fn with_operator(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
            connector: None,
        }
    }

    /// Add an AND connector.
    pub fn and(mut self) -> Self {
        self.connector = Some(Connector::And);
        self
    }

    /// Add an OR connector.
    pub fn or(mut self) -> Self {
        self.connector = Some(Connector::Or);
        self
    }
}

// ─── Sort / Pagination ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification (field + direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: SortDirection,
}

impl SortBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }
}

/// Query parameters for `find_many`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyQuery {
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
}

impl FindManyQuery {
    pub fn filtered(where_clauses: Vec<WhereClause>) -> Self {
        Self {
            where_clauses,
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

// ─── Schema Status ───────────────────────────────────────────────

/// Result of a schema comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaStatus {
    /// Schema matches; no changes needed.
    UpToDate,
    /// Schema was missing tables. Contains the statements that create them.
    NeedsMigration { statements: Vec<String> },
}

/// Options for schema creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaOptions {
    /// If true, apply the missing statements immediately.
    #[serde(default)]
    pub auto_migrate: bool,
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The storage adapter trait.
///
/// Implementations must enforce the unique constraints declared by the
/// `MarketSchema` they were set up with, atomically with the write, and
/// report violations as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Insert a record. Returns the stored record.
    async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value>;

    /// Find a single record matching the WHERE clauses.
    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find multiple records matching the query parameters.
    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<serde_json::Value>>;

    /// Count records matching the WHERE clauses.
    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Update the first record matching the WHERE clauses.
    /// Returns the updated record, or `None` if no match was found.
    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Delete every record matching the WHERE clauses. Returns the number deleted.
    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Ensure the tables of `schema` exist.
    async fn create_schema(&self, schema: &MarketSchema, options: &SchemaOptions) -> AdapterResult<SchemaStatus>;

    /// Begin a new transaction.
    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>>;
}

/// Extension of [`Adapter`] for transaction contexts.
#[async_trait]
pub trait TransactionAdapter: Adapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()>;

    async fn rollback(self: Box<Self>) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_clause_builders() {
        let clause = WhereClause::eq("userId", "u1").and();
        assert_eq!(clause.operator, Operator::Eq);
        assert_eq!(clause.connector, Some(Connector::And));

        let clause = WhereClause::with_operator("expiresAt", Operator::Lte, "2025-01-01T00:00:00Z");
        assert_eq!(clause.operator, Operator::Lte);
        assert!(clause.connector.is_none());
    }

    #[test]
    fn test_find_many_query_builders() {
        let query = FindManyQuery::filtered(vec![WhereClause::eq("isPublished", true)])
            .sorted(SortBy::desc("createdAt"))
            .page(20, 40);
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, Some(40));
        assert_eq!(query.sort_by.unwrap().direction, SortDirection::Desc);
    }
}
