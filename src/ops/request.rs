//! Paginated search requests.

use serde::{Deserialize, Serialize};

use super::OpsError;

/// Largest range OPS accepts in a single search call
pub const MAX_PAGE_SIZE: u32 = 100;

/// OPS never returns results beyond this position
pub const MAX_RESULTS: u32 = 2000;

/// One paginated search call: a query plus a 1-based inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub range_begin: u32,
    pub range_end: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, range_begin: u32, range_end: u32) -> Result<Self, OpsError> {
        if range_begin == 0 {
            return Err(OpsError::InvalidRequest(
                "range begin is 1-based".to_string(),
            ));
        }
        if range_end < range_begin {
            return Err(OpsError::InvalidRequest(format!(
                "range end {} precedes range begin {}",
                range_end, range_begin
            )));
        }
        if range_end - range_begin + 1 > MAX_PAGE_SIZE {
            return Err(OpsError::InvalidRequest(format!(
                "range {}-{} exceeds the page size limit of {}",
                range_begin, range_end, MAX_PAGE_SIZE
            )));
        }

        Ok(Self {
            query: query.into(),
            range_begin,
            range_end,
        })
    }

    /// Value of the `Range` parameter, e.g. `1-25`
    pub fn range(&self) -> String {
        format!("{}-{}", self.range_begin, self.range_end)
    }
}

/// Range windows covering `total` results in pages of `page_size`,
/// capped at [`MAX_RESULTS`].
pub fn windows(page_size: u32, total: u64) -> Vec<(u32, u32)> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let last = total.min(MAX_RESULTS as u64) as u32;

    let mut ranges = Vec::new();
    let mut begin = 1;
    while begin <= last {
        let end = (begin + page_size - 1).min(last);
        ranges.push((begin, end));
        begin = end + 1;
    }
    ranges
}
