//! Database table modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

pub mod api_keys; // api_key_history, api_key_usage
mod auth;         // users, auth_sessions
mod chatbots;     // instance_chatbots
pub mod cleanup;  // retention sweeps across tables
pub mod daily_stats; // instance_daily_stats, user_daily_usage
mod instances;    // instances
mod messages;     // messages
mod profiles;     // profiles
