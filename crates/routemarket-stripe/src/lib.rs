//! # routemarket-stripe
//!
//! Stripe integration for RouteMarket.
//!
//! - [`webhook`] verifies `Stripe-Signature` headers and decodes the events
//!   the marketplace reacts to into [`StripeEvent`].
//! - [`client`] creates PaymentIntents over the Stripe REST API.
//! - [`config`] holds keys and the price → plan table.

pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod webhook;

pub use client::{CreatePaymentIntent, PaymentIntent, StripeClient};
pub use config::{Plan, StripeConfig};
pub use error::StripeError;
pub use types::*;
pub use webhook::{construct_event, parse_event, verify_webhook_signature};
