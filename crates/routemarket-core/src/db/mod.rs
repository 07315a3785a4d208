pub mod adapter;
pub mod models;
pub mod schema;

pub use adapter::{Adapter, AdapterResult, TransactionAdapter};
pub use models::{EmailDownloadToken, EmailSubscriber, Purchase, Route, Subscription, User};
pub use schema::{FieldType, MarketSchema, SchemaField, TableSchema};
