// routemarket: entitlement core and marketplace operations.
//
// Wires the typed store, the purchase ledger, the subscription state machine,
// the free-tier token gate and the pluggable collaborators into `MarketContext`.

pub mod accounts;
pub mod catalog;
pub mod context;
pub mod crypto;
pub mod dashboard;
pub mod email;
pub mod entitlement;
pub mod free_tier;
pub mod ledger;
pub mod payments;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

pub use accounts::{authenticate, require_admin, sign_in, sign_up, AuthSession, SignUp, UserRef};
pub use catalog::{NewRoute, Pagination, RoutePage, Upload};
pub use context::MarketContext;
pub use entitlement::{evaluate, Entitlement, GrantReason};
pub use free_tier::{IssuedToken, RouteContentLocation};
pub use ledger::{record_confirmed_payment, ConfirmedPayment, PaymentRecord};
pub use store::MarketStore;
pub use subscriptions::SubscriptionChange;
pub use webhooks::{handle_stripe_webhook, WebhookOutcome};

// Re-export the core crate so callers need a single dependency.
pub use routemarket_core as core;
pub use routemarket_core::{ErrorCode, MarketError, MarketplaceOptions, Result};
