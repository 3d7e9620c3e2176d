//! # Revsync Library
//!
//! Core functionality for the revsync service: platform integrations,
//! credential storage, review reconciliation, rating caching, and the
//! HTTP API surface.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod platforms;
pub mod rating_cache;
pub mod reconcile;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token_refresh;
pub use migration;
