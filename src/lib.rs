//! # Patent Harvest
//!
//! Collects patent publication data from the EPO Open Patent Services (OPS)
//! for industry-level innovation panels.
//!
//! ## Architecture
//!
//! - [`ops`]: OPS client: credentials, backoff, transport and the retry loop
//! - [`query`]: NACE keyword tables and CQL query plans
//! - [`extract`]: flattening of search and biblio responses
//! - [`collect`]: batch runs over a query plan
//! - [`transform`]: per-industry, per-year patent counts
//! - [`models`]: flat record types
//! - [`utils`]: HTTP client, record store, progress output
//! - [`config`]: configuration management

pub mod collect;
pub mod config;
pub mod extract;
pub mod models;
pub mod ops;
pub mod query;
pub mod transform;
pub mod utils;

pub use collect::{CollectSummary, Session};
pub use ops::{OpsError, Retriever};
pub use query::QueryPlan;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
