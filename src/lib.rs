//! Review sync: review-notification ingestion and source → workflow reconciliation.

pub mod clients;
pub mod config;
pub mod control;
pub mod error;
pub mod hooks;
pub mod mail;
pub mod notify;
pub mod store;
pub mod sync;
