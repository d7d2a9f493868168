//! Workflow collaborators: durable per-chat stores, the Advisor, and the
//! poll merge that combines them.

pub mod advisor;
pub mod chat_state;
pub mod fridge;
pub mod poll;
pub mod stats;
pub mod suggestions;
pub mod votes;

#[cfg(test)]
pub mod memory;
