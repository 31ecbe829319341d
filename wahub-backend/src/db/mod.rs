pub mod sqlite;
mod tables;

pub use sqlite::Database;
pub use tables::cleanup::CleanupReport;
pub use tables::daily_stats::StatDelta;
pub use tables::api_keys::fill_usage_days;
