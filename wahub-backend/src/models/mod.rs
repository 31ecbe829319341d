pub mod api_key;
pub mod chatbot;
pub mod instance;
pub mod message;
pub mod plan;
pub mod session;
pub mod stats;
pub mod user;

pub use api_key::{ApiKeyAction, ApiKeyHistoryEntry, ApiUsageSummary, EndpointUsage, UsageDay};
pub use chatbot::{ChatbotRule, InstanceChatbot, MatchType, UpdateChatbotRequest};
pub use instance::{CreateInstanceRequest, Instance, InstanceStatus};
pub use message::{ChatSummary, Message, MessageDirection, MessageStatus, NewMessage};
pub use plan::{DailyQuota, Plan, PlanLimits, PlanOffer};
pub use session::Session;
pub use stats::{DailyStat, StatsSummary};
pub use user::{Profile, UpdateProfileRequest, User};
