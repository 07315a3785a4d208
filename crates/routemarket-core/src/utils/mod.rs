// Utility functions: id generation and email normalisation.

pub mod id;

pub use id::{generate_id, normalize_email, is_valid_email};
