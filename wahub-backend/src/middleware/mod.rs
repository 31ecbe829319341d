pub mod session_auth;

pub use session_auth::{require_api_key, require_user};
