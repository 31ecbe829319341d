//! Client side of the external WhatsApp backend

pub mod client;
pub mod jid;
pub mod retry;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use client::{BackendClient, BackendError, MessageSender};
pub use types::Contact;
