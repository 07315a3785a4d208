// Crypto module: password hashing, session JWTs, random tokens.

pub mod jwt;
pub mod password;
pub mod random;

pub use jwt::{sign_jwt, verify_jwt};
pub use password::{hash_password, verify_password};
pub use random::generate_token_hex;
