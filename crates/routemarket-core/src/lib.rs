//! Core types for RouteMarket: error taxonomy, configuration, typed models,
//! the storage [`Adapter`] trait and the table schema it is set up with.

pub mod db;
pub mod env;
pub mod error;
pub mod options;
pub mod utils;

// Re-exports for convenience
pub use db::adapter::{Adapter, AdapterResult, TransactionAdapter};
pub use db::models::{
    AccessType, Difficulty, EmailDownloadToken, EmailSubscriber, PaymentProviderKind, Purchase,
    PurchaseStatus, Role, Route, Subscription, SubscriptionStatus, User, UserProfile,
    UserSubscriptionStatus,
};
pub use db::schema::MarketSchema;
pub use error::{ErrorCode, HttpStatus, MarketError, Result, StoreError};
pub use options::MarketplaceOptions;
