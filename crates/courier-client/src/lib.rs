/// Courier client library: connects to a relay, registers, and turns the
/// inbound frame stream into `ClientEvent`s.

pub mod client;
pub mod event;

pub use client::{Client, generate_client_id};
pub use event::ClientEvent;
