//! Credentials: password hashing, API keys and webhook signatures

pub mod api_key;
pub mod password;
pub mod signature;

pub use api_key::{generate_api_key, mask_api_key};
