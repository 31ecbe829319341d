pub mod actix_ws;
pub mod events;
pub mod methods;
pub mod protocol;

pub use events::EventBroadcaster;
