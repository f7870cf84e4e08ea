//! Chatkeep - local chat history and project snapshot store

pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod deploy;
pub mod error;
pub mod history;
pub mod store;

pub use error::{StoreError, StoreResult};
