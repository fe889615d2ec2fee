//! Batch collection over a [`QueryPlan`].
//!
//! A [`Session`] owns the mutable retrieval state (token and backoff) for
//! one run. Each planned query is paginated window by window, every window
//! goes through the [`Retriever`], and whatever it yields is flattened and
//! appended to a [`RecordStore`].
//!
//! Requests are strictly sequential. A query that OPS rejects or answers
//! with a malformed document is logged and skipped; transport failures,
//! failed renewals and exhausted retry limits stop the run.

use crate::extract::{extract_search, total_result_count};
use crate::models::{BiblioEnvelope, SearchContext};
use crate::ops::{
    windows, Backoff, CredentialManager, Endpoint, OpsError, OpsResponse, Pause, Retriever,
    SearchRequest, SearchTransport, TokioPause, MAX_PAGE_SIZE,
};
use crate::query::{PlannedQuery, QueryPlan};
use crate::utils::{QueryProgress, RecordStore};

/// One answered window of a query
#[derive(Debug, Clone)]
pub struct Page {
    pub request: SearchRequest,
    pub response: OpsResponse,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Queries attempted
    pub queries: usize,
    /// Windows answered with results
    pub pages: usize,
    /// Records (or envelopes) appended to the store
    pub records: usize,
    /// Queries OPS had no results for
    pub empty: usize,
    /// Queries or windows skipped after a non-fatal error
    pub skipped: usize,
}

/// Retrieval state for one collection run.
#[derive(Debug)]
pub struct Session<T, P = TokioPause> {
    retriever: Retriever<T, P>,
    credentials: CredentialManager,
    backoff: Backoff,
    page_size: u32,
}

impl<T: SearchTransport, P: Pause> Session<T, P> {
    pub fn new(
        retriever: Retriever<T, P>,
        credentials: CredentialManager,
        backoff: Backoff,
        page_size: u32,
    ) -> Result<Self, OpsError> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(OpsError::Config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        Ok(Self {
            retriever,
            credentials,
            backoff,
            page_size,
        })
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn retriever(&self) -> &Retriever<T, P> {
        &self.retriever
    }

    async fn fetch(
        &mut self,
        endpoint: Endpoint,
        query: &str,
        begin: u32,
        end: u32,
    ) -> Result<Page, OpsError> {
        let request = SearchRequest::new(query, begin, end)?;
        let response = self
            .retriever
            .fetch(&mut self.credentials, &mut self.backoff, &request, endpoint)
            .await?;
        Ok(Page { request, response })
    }

    /// Walk every window of `query`, handing each answered page to
    /// `on_page` before the next window is requested.
    ///
    /// The first window tells how many results exist; the remaining windows
    /// follow up to the OPS result ceiling. Returns the number of pages
    /// handed over, zero when OPS found nothing. A later window answered
    /// with a failure status ends the query early. An error from a later
    /// window or from `on_page` propagates, and pages already handed over
    /// stay with the caller.
    pub async fn for_each_page<F>(
        &mut self,
        endpoint: Endpoint,
        query: &str,
        mut on_page: F,
    ) -> Result<usize, OpsError>
    where
        F: FnMut(Page) -> Result<(), OpsError>,
    {
        let first = self.fetch(endpoint, query, 1, self.page_size).await?;
        if first.response.is_entity_not_found() {
            tracing::debug!("No results for '{}'", query);
            return Ok(0);
        }
        if !first.response.is_success() {
            return Err(OpsError::Rejected {
                status: first.response.status,
                body: first.response.body,
            });
        }

        let total = total_result_count(&first.response.json()?)?;
        tracing::debug!("'{}' has {} results", query, total);

        on_page(first)?;
        let mut answered = 1;
        for (begin, end) in windows(self.page_size, total).into_iter().skip(1) {
            let page = self.fetch(endpoint, query, begin, end).await?;
            if !page.response.is_success() {
                tracing::warn!(
                    "Range {} of '{}' answered with status {}, stopping this query",
                    page.request.range(),
                    query,
                    page.response.status
                );
                break;
            }
            on_page(page)?;
            answered += 1;
        }

        Ok(answered)
    }

    /// Every answered window of `query`, gathered in memory.
    pub async fn paginate(&mut self, endpoint: Endpoint, query: &str) -> Result<Vec<Page>, OpsError> {
        let mut pages = Vec::new();
        self.for_each_page(endpoint, query, |page| {
            pages.push(page);
            Ok(())
        })
        .await?;
        Ok(pages)
    }

    /// Collect publication references for every query in `plan`.
    ///
    /// Records are appended as each page arrives.
    pub async fn collect_search(
        &mut self,
        plan: &QueryPlan,
        store: &RecordStore,
        progress: &QueryProgress,
    ) -> Result<CollectSummary, OpsError> {
        let mut summary = CollectSummary::default();

        for planned in plan.iter() {
            summary.queries += 1;
            progress.set_message(label(&planned));

            let result = self
                .for_each_page(Endpoint::Search, planned.query, |page| {
                    let context = SearchContext::new(
                        planned.country,
                        planned.industry,
                        planned.division,
                        &page.request,
                    );
                    match extract_search(&page.response, &context) {
                        Ok(Some(records)) => {
                            store.append(&records)?;
                            summary.pages += 1;
                            summary.records += records.len();
                            tracing::info!(
                                "Stored {} records for {} (range {})",
                                records.len(),
                                label(&planned),
                                page.request.range()
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            skip_or_abort(e, &planned)?;
                            summary.skipped += 1;
                        }
                    }
                    Ok(())
                })
                .await;

            tally(result, &planned, &mut summary)?;
            progress.inc();
        }

        Ok(summary)
    }

    /// Collect raw biblio responses for every query in `plan`, one
    /// [`BiblioEnvelope`] per answered window, appended as it arrives.
    pub async fn collect_biblio(
        &mut self,
        plan: &QueryPlan,
        store: &RecordStore,
        progress: &QueryProgress,
    ) -> Result<CollectSummary, OpsError> {
        let mut summary = CollectSummary::default();

        for planned in plan.iter() {
            summary.queries += 1;
            progress.set_message(label(&planned));

            let result = self
                .for_each_page(Endpoint::BiblioSearch, planned.query, |page| {
                    match page.response.json() {
                        Ok(response) => {
                            let range = page.request.range();
                            let envelope = BiblioEnvelope {
                                country: planned.country.to_string(),
                                industry: planned.industry.to_string(),
                                division: planned.division.to_string(),
                                query: page.request.query,
                                range_begin: page.request.range_begin,
                                range_end: page.request.range_end,
                                response,
                            };
                            store.append(std::slice::from_ref(&envelope))?;
                            summary.pages += 1;
                            summary.records += 1;
                            tracing::info!(
                                "Stored biblio page for {} (range {})",
                                label(&planned),
                                range
                            );
                        }
                        Err(e) => {
                            skip_or_abort(e, &planned)?;
                            summary.skipped += 1;
                        }
                    }
                    Ok(())
                })
                .await;

            tally(result, &planned, &mut summary)?;
            progress.inc();
        }

        Ok(summary)
    }
}

fn tally(
    result: Result<usize, OpsError>,
    planned: &PlannedQuery<'_>,
    summary: &mut CollectSummary,
) -> Result<(), OpsError> {
    match result {
        Ok(0) => summary.empty += 1,
        Ok(_) => {}
        Err(e) => {
            skip_or_abort(e, planned)?;
            summary.skipped += 1;
        }
    }
    Ok(())
}

fn label(planned: &PlannedQuery<'_>) -> String {
    format!("{}/{}/{}", planned.country, planned.industry, planned.division)
}

fn skip_or_abort(err: OpsError, planned: &PlannedQuery<'_>) -> Result<(), OpsError> {
    if err.is_fatal() {
        return Err(err);
    }
    tracing::warn!("Skipping {} '{}': {}", label(planned), planned.query, err);
    Ok(())
}
