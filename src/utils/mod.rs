//! Supporting utilities.
//!
//! - [`HttpClient`]: shared reqwest client with the crate's user agent
//! - [`RecordStore`]: append-only JSON array on disk
//! - [`QueryProgress`]: terminal progress bar for query runs

mod http;
mod progress;
mod store;

pub use http::{get_user_agent, HttpClient, DEFAULT_TIMEOUT_SECS};
pub use progress::QueryProgress;
pub use store::RecordStore;
