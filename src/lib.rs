//! domainwatch - TLS certificate and domain registration expiry monitor
//!
//! This library probes monitored domains for certificate and WHOIS
//! registration expiry, persists the results, and sends deduplicated alerts
//! over email and webhooks.
pub mod api;
pub mod app;
pub mod batch;
pub mod checker;
pub mod cli;
pub mod config;
pub mod core;
pub mod deduplication;
pub mod domain_name;
pub mod formatting;
pub mod internal_metrics;
pub mod notification;
pub mod probe;
pub mod status;
pub mod store;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
