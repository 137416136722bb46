//! Core types and shared functionality for shulboard.
//!
//! This crate provides:
//! - Tiered response cache with SQLite backend
//! - Document storage for board content
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod documents;
pub mod error;

pub use cache::{StoreDb, StoredResponse, Tier, TierKind, fresh_entry, live_tier_names, put_response};
pub use config::AppConfig;
pub use documents::Document;
pub use error::Error;
