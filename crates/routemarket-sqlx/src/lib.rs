// routemarket-sqlx: SQLx storage adapter for RouteMarket.
//
// Implements the core Adapter trait on sqlx::AnyPool, supporting SQLite and
// Postgres, with DDL generated from the marketplace schema.

pub mod adapter;
pub mod query_builder;
pub mod schema;
pub mod transaction;

pub use adapter::SqlxAdapter;
pub use schema::{create_schema, plan_migrations, DatabaseType};
pub use transaction::SqlxTransactionAdapter;
