//! Table repositories

pub mod chat;
pub mod snapshot;
