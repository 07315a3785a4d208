// DDL generation and schema creation for the SQL backends.
//
// Introspects which tables already exist and emits CREATE TABLE / CREATE
// INDEX statements for the missing ones. Unique constraints are named
// `{table}_{col}[_{col}]_key` so violations can be traced back to columns.

use sqlx::{AnyPool, Row};

use routemarket_core::db::adapter::{SchemaOptions, SchemaStatus};
use routemarket_core::db::schema::{FieldType, MarketSchema, TableSchema};
use routemarket_core::error::StoreError;

use crate::query_builder::quote_identifier;

/// SQL dialects the adapter supports through `sqlx::Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    Sqlite,
    Postgres,
}

impl DatabaseType {
    /// Infer the dialect from a connection URL.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            DatabaseType::Postgres
        } else {
            DatabaseType::Sqlite
        }
    }
}

/// Column type for a schema field.
pub fn column_type(field_type: FieldType, db_type: DatabaseType) -> &'static str {
    match (field_type, db_type) {
        (FieldType::String | FieldType::Date, _) => "TEXT",
        (FieldType::Integer, DatabaseType::Sqlite) => "INTEGER",
        (FieldType::Integer, DatabaseType::Postgres) => "BIGINT",
        (FieldType::Number, DatabaseType::Sqlite) => "REAL",
        (FieldType::Number, DatabaseType::Postgres) => "DOUBLE PRECISION",
        (FieldType::Boolean, DatabaseType::Sqlite) => "INTEGER",
        (FieldType::Boolean, DatabaseType::Postgres) => "BOOLEAN",
    }
}

/// Name of the unique constraint over `columns`.
pub fn constraint_name(table: &str, columns: &[String]) -> String {
    format!("{}_{}_key", table, columns.join("_"))
}

/// CREATE TABLE statement for one table, including unique constraints.
pub fn generate_create_table(table: &TableSchema, db_type: DatabaseType) -> String {
    let mut parts = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote_identifier("id"))];

    for field in &table.fields {
        let mut col = format!(
            "{} {}",
            quote_identifier(&field.name),
            column_type(field.field_type, db_type)
        );
        if field.required {
            col.push_str(" NOT NULL");
        }
        if let Some((ref_table, ref_col)) = &field.references {
            col.push_str(&format!(
                " REFERENCES {} ({})",
                quote_identifier(ref_table),
                quote_identifier(ref_col)
            ));
        }
        parts.push(col);
    }

    for columns in &table.unique {
        let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        parts.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_identifier(&constraint_name(&table.name, columns)),
            quoted.join(", ")
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(&table.name),
        parts.join(", ")
    )
}

/// CREATE INDEX statements for foreign-key columns.
pub fn generate_index_ddl(table: &TableSchema) -> Vec<String> {
    table
        .fields
        .iter()
        .filter(|f| f.references.is_some())
        .map(|f| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_identifier(&format!("{}_{}_idx", table.name, f.name)),
                quote_identifier(&table.name),
                quote_identifier(&f.name)
            )
        })
        .collect()
}

/// All statements needed to create `tables`, in order.
pub fn generate_ddl_for(tables: &[&TableSchema], db_type: DatabaseType) -> Vec<String> {
    let mut statements: Vec<String> = tables
        .iter()
        .map(|t| generate_create_table(t, db_type))
        .collect();
    statements.extend(tables.iter().flat_map(|t| generate_index_ddl(t)));
    statements
}

/// Names of the tables that already exist.
pub async fn existing_tables(pool: &AnyPool, db_type: DatabaseType) -> Result<Vec<String>, StoreError> {
    let sql = match db_type {
        DatabaseType::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
        }
        DatabaseType::Postgres => {
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
        }
    };

    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::Database(format!("table introspection failed: {e}")))?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("name")
                .map_err(|e| StoreError::Database(format!("failed to read table name: {e}")))
        })
        .collect()
}

/// Statements that would create the tables of `schema` missing from the database.
pub async fn plan_migrations(
    pool: &AnyPool,
    schema: &MarketSchema,
    db_type: DatabaseType,
) -> Result<Vec<String>, StoreError> {
    let existing = existing_tables(pool, db_type).await?;
    let missing: Vec<&TableSchema> = schema
        .tables
        .iter()
        .filter(|t| !existing.iter().any(|name| name == &t.name))
        .collect();
    Ok(generate_ddl_for(&missing, db_type))
}

/// Create missing tables, or report what would be created.
pub async fn create_schema(
    pool: &AnyPool,
    schema: &MarketSchema,
    db_type: DatabaseType,
    options: &SchemaOptions,
) -> Result<SchemaStatus, StoreError> {
    let statements = plan_migrations(pool, schema, db_type).await?;
    if statements.is_empty() {
        return Ok(SchemaStatus::UpToDate);
    }
    if !options.auto_migrate {
        return Ok(SchemaStatus::NeedsMigration { statements });
    }

    for stmt in &statements {
        tracing::debug!(sql = %stmt, "applying migration");
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}; SQL: {stmt}")))?;
    }
    tracing::info!(count = statements.len(), "schema migrated");
    Ok(SchemaStatus::UpToDate)
}
