//! Integration tests for Patent Harvest
//!
//! These run the OPS client against a local mock server: authentication,
//! the retrieval loop, pagination and flattening end to end.

use async_trait::async_trait;
use mockito::{Matcher, Server};
use patent_harvest::collect::Session;
use patent_harvest::extract::{extract_biblio, extract_biblio_envelopes, extract_search};
use patent_harvest::models::{BiblioEnvelope, SearchContext, SearchRecord};
use patent_harvest::ops::{
    Backoff, ClientCredentials, CredentialManager, Credentials, Endpoint, HttpTransport, OpsError,
    Retriever, SearchRequest, TokenExchange, TokioPause,
};
use patent_harvest::query::QueryPlan;
use patent_harvest::utils::{HttpClient, QueryProgress, RecordStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const QUERY: &str = "ta = \"foo\" AND cpc any \"Y02\" AND AP=\"DE\"";

fn biblio_body() -> String {
    json!({
        "ops:world-patent-data": {
            "ops:biblio-search": {
                "@total-result-count": "1",
                "ops:query": {"$": QUERY},
                "ops:search-result": {
                    "exchange-documents": {
                        "exchange-document": {
                            "@system": "ops.epo.org",
                            "@family-id": "60011223",
                            "@country": "EP",
                            "@doc-number": "3300400",
                            "@kind": "A1",
                            "bibliographic-data": {
                                "publication-reference": {
                                    "document-id": {"@document-id-type": "docdb", "date": {"$": "20180404"}}
                                },
                                "patent-classifications": {
                                    "patent-classification": {
                                        "classification-scheme": {"@office": "EP", "@scheme": "CPCI"},
                                        "section": {"$": "Y"},
                                        "class": {"$": "02"},
                                        "subclass": {"$": "E"},
                                        "main-group": {"$": "10"},
                                        "subgroup": {"$": "50"},
                                        "classification-value": {"$": "A"},
                                        "generating-office": {"$": "EP"}
                                    }
                                },
                                "application-reference": {"@doc-id": "481516"},
                                "priority-claims": {"priority-claim": {"@sequence": "1"}},
                                "parties": {
                                    "applicants": {
                                        "applicant": {"@data-format": "original", "applicant-name": {"name": {"$": "Foo Werke AG"}}}
                                    }
                                },
                                "invention-title": {"@lang": "en", "$": "Foo turbine"}
                            },
                            "abstract": {"@lang": "en", "p": {"$": "A turbine for foo."}}
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

/// Hands out `old` first and `new` on every renewal.
#[derive(Debug, Default)]
struct RotatingExchange {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenExchange for RotatingExchange {
    async fn acquire(&self) -> Result<String, OpsError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok("old".to_string()),
            _ => Ok("new".to_string()),
        }
    }
}

#[derive(Debug)]
struct FixedExchange(&'static str);

#[async_trait]
impl TokenExchange for FixedExchange {
    async fn acquire(&self) -> Result<String, OpsError> {
        Ok(self.0.to_string())
    }
}

fn http() -> HttpClient {
    HttpClient::with_timeout(5).unwrap()
}

#[tokio::test]
async fn test_authenticated_biblio_search() {
    let mut server = Server::new_async().await;
    let auth = server
        .mock("POST", "/auth/accesstoken")
        .match_header("authorization", "Basic a2V5OnNlY3JldA==")
        .with_status(200)
        .with_body(r#"{"access_token":"tok123","token_type":"BearerToken","expires_in":"1199"}"#)
        .expect(1)
        .create_async()
        .await;
    let search = server
        .mock("GET", "/published-data/search/biblio")
        .match_header("authorization", "Bearer tok123")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), QUERY.into()),
            Matcher::UrlEncoded("Range".into(), "1-25".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(biblio_body())
        .expect(1)
        .create_async()
        .await;

    let exchange = ClientCredentials::with_url(
        http(),
        Credentials::new("key", "secret"),
        format!("{}/auth/accesstoken", server.url()),
    );
    let mut credentials = CredentialManager::acquire(exchange).await.unwrap();
    let mut backoff = Backoff::new(10.0, 120.0, 10);
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause);

    let request = SearchRequest::new(QUERY, 1, 25).unwrap();
    let response = retriever
        .fetch(&mut credentials, &mut backoff, &request, Endpoint::BiblioSearch)
        .await
        .unwrap();

    let context = SearchContext::new("DE", "D", "35", &request);
    let records = extract_biblio(&response, &context).unwrap().unwrap();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.publication_number(), "EP3300400A1");
    assert_eq!(record.document_date, "20180404");
    assert_eq!(record.applicants, vec!["Foo Werke AG"]);
    assert_eq!(record.patent_classifications.len(), 1);
    assert_eq!(record.abstract_text.as_deref(), Some("A turbine for foo."));
    assert!(record.inventors.is_none());
    assert!(record.references_cited.is_none());

    auth.assert_async().await;
    search.assert_async().await;
}

#[tokio::test]
async fn test_single_publication_reference_from_biblio_endpoint() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/published-data/search/biblio")
        .match_header("authorization", "Bearer tok123")
        .match_header("range", "1-25")
        .match_query(Matcher::UrlEncoded("q".into(), QUERY.into()))
        .with_status(200)
        .with_body(
            json!({
                "ops:world-patent-data": {
                    "ops:biblio-search": {
                        "@total-result-count": "1",
                        "ops:search-result": {
                            "ops:publication-reference": {
                                "@family-id": "42",
                                "document-id": {
                                    "@document-id-type": "docdb",
                                    "country": {"$": "DE"},
                                    "doc-number": {"$": "102019000001"},
                                    "kind": {"$": "A1"}
                                }
                            }
                        }
                    }
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let mut credentials = CredentialManager::acquire(FixedExchange("tok123"))
        .await
        .unwrap();
    let mut backoff = Backoff::new(10.0, 120.0, 10);
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause);

    let request = SearchRequest::new(QUERY, 1, 25).unwrap();
    let response = retriever
        .fetch(&mut credentials, &mut backoff, &request, Endpoint::BiblioSearch)
        .await
        .unwrap();

    let context = SearchContext::new("DE", "C", "10", &request);
    let records = extract_search(&response, &context).unwrap().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].publication_number, "DE102019000001A1");
    search.assert_async().await;
}

#[tokio::test]
async fn test_expired_token_is_renewed_transparently() {
    let mut server = Server::new_async().await;
    let expired = server
        .mock("GET", "/published-data/search")
        .match_header("authorization", "Bearer old")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body("<fault><code>CLIENT.InvalidAccessToken</code><message>Access token has expired</message></fault>")
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/published-data/search")
        .match_header("authorization", "Bearer new")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"ops:world-patent-data":{"ops:biblio-search":{"@total-result-count":"0"}}}"#)
        .expect(1)
        .create_async()
        .await;

    let mut credentials = CredentialManager::acquire(RotatingExchange::default())
        .await
        .unwrap();
    let mut backoff = Backoff::new(10.0, 120.0, 10);
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause)
        .with_renew_delay(Duration::ZERO);

    let request = SearchRequest::new(QUERY, 1, 100).unwrap();
    let response = retriever
        .fetch(&mut credentials, &mut backoff, &request, Endpoint::Search)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(credentials.token(), "new");
    assert_eq!(credentials.renewals(), 1);
    assert_eq!(backoff.step(), 0);
    expired.assert_async().await;
    fresh.assert_async().await;
}

fn search_page(total: u64, numbers: &[&str]) -> String {
    let references: Vec<Value> = numbers
        .iter()
        .map(|n| {
            json!({
                "@family-id": "1",
                "document-id": {
                    "@document-id-type": "docdb",
                    "country": {"$": "DE"},
                    "doc-number": {"$": n},
                    "kind": {"$": "A1"}
                }
            })
        })
        .collect();
    json!({
        "ops:world-patent-data": {
            "ops:biblio-search": {
                "@total-result-count": total.to_string(),
                "ops:search-result": {"ops:publication-reference": references}
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_collect_paginates_into_store() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/published-data/search")
        .match_query(Matcher::UrlEncoded("Range".into(), "1-2".into()))
        .with_status(200)
        .with_header("x-throttling-control", "idle")
        .with_body(search_page(3, &["1001", "1002"]))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/published-data/search")
        .match_query(Matcher::UrlEncoded("Range".into(), "3-3".into()))
        .with_status(200)
        .with_body(search_page(3, &["1003"]))
        .expect(1)
        .create_async()
        .await;

    let credentials = CredentialManager::acquire(RotatingExchange::default())
        .await
        .unwrap();
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause);
    let mut session = Session::new(retriever, credentials, Backoff::new(10.0, 120.0, 10), 2).unwrap();

    let mut plan = QueryPlan::new();
    plan.insert("DE", "D", "35", vec![QUERY.to_string()]);

    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("search_results.json"));
    let summary = session
        .collect_search(&plan, &store, &QueryProgress::hidden(1))
        .await
        .unwrap();

    assert_eq!(summary.queries, 1);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.records, 3);

    let records: Vec<SearchRecord> = store.load().unwrap();
    let numbers: Vec<&str> = records.iter().map(|r| r.publication_number.as_str()).collect();
    assert_eq!(numbers, vec!["DE1001A1", "DE1002A1", "DE1003A1"]);
    assert_eq!(records[0].total_results, 3);
    assert_eq!(records[0].industry, "D");
    assert_eq!(
        records[0].header.get("x-throttling-control").map(String::as_str),
        Some("idle")
    );
    assert_eq!(records[2].range_begin, 3);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_biblio_collection_round_trips_through_store() {
    let mut server = Server::new_async().await;
    let _biblio = server
        .mock("GET", "/published-data/search/biblio")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(biblio_body())
        .create_async()
        .await;

    let credentials = CredentialManager::acquire(RotatingExchange::default())
        .await
        .unwrap();
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause);
    let mut session = Session::new(retriever, credentials, Backoff::new(10.0, 120.0, 10), 100).unwrap();

    let mut plan = QueryPlan::new();
    plan.insert("DE", "D", "35", vec![QUERY.to_string()]);

    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("biblio.json"));
    session
        .collect_biblio(&plan, &store, &QueryProgress::hidden(1))
        .await
        .unwrap();

    let envelopes: Vec<BiblioEnvelope> = store.load().unwrap();
    let records = extract_biblio_envelopes(&envelopes).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query_country, "DE");
    assert_eq!(records[0].query_industry, "D");
    assert_eq!(records[0].query_division, "35");
}

#[tokio::test]
async fn test_no_results_is_not_an_error() {
    let mut server = Server::new_async().await;
    let _empty = server
        .mock("GET", "/published-data/search")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body("<fault xmlns=\"http://ops.epo.org\"><code>SERVER.EntityNotFound</code><message>No results found</message></fault>")
        .create_async()
        .await;

    let credentials = CredentialManager::acquire(RotatingExchange::default())
        .await
        .unwrap();
    let retriever = Retriever::new(HttpTransport::with_base_url(http(), server.url()), TokioPause);
    let mut session = Session::new(retriever, credentials, Backoff::new(10.0, 120.0, 10), 100).unwrap();

    let mut plan = QueryPlan::new();
    plan.insert("FR", "C", "10", vec![QUERY.to_string()]);

    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("search_results.json"));
    let summary = session
        .collect_search(&plan, &store, &QueryProgress::hidden(1))
        .await
        .unwrap();

    assert_eq!(summary.empty, 1);
    assert_eq!(summary.records, 0);
    assert!(store.is_empty().unwrap());
}
