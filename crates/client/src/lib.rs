//! Client code for shulboard.
//!
//! This crate provides the HTTP upstream pipeline, the caching strategies
//! built on it, and the background refresh queue shared by the gateway's
//! request handlers.

pub mod fetch;
pub mod revalidate;
pub mod strategy;

pub use fetch::{HttpUpstream, Upstream, UpstreamConfig, UpstreamResponse};
pub use revalidate::{RefreshHandle, Revalidator};
pub use strategy::{CacheEngine, fetch_and_cache};
