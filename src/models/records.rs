//! Flat records produced from OPS responses.
//!
//! Field names on the wire follow the column names used by the downstream
//! panel tooling, hence the mix of `_` and `-` in the serde renames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ops::SearchRequest;

/// Where a response came from: the plan coordinates plus the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    pub country: String,
    pub industry: String,
    pub division: String,
    pub query: String,
    pub range_begin: u32,
    pub range_end: u32,
}

impl SearchContext {
    pub fn new(country: &str, industry: &str, division: &str, request: &SearchRequest) -> Self {
        Self {
            country: country.to_string(),
            industry: industry.to_string(),
            division: division.to_string(),
            query: request.query.clone(),
            range_begin: request.range_begin,
            range_end: request.range_end,
        }
    }
}

/// One publication reference from the search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub header: BTreeMap<String, String>,
    pub country: String,
    pub industry: String,
    pub division: String,
    pub query: String,
    pub total_results: u64,
    pub range_begin: u32,
    pub range_end: u32,
    pub family_id: String,
    pub document_id_type: String,
    #[serde(rename = "document-id_country")]
    pub document_id_country: String,
    #[serde(rename = "document-id_doc-number")]
    pub document_id_doc_number: String,
    #[serde(rename = "document-id_kind")]
    pub document_id_kind: String,
    /// country + doc number + kind, e.g. `EP1234567A1`
    pub publication_number: String,
}

/// One classification entry of an exchange document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub office: String,
    pub section: String,
    pub class: String,
    pub subclass: String,
    pub main_group: String,
    pub subgroup: String,
    pub value: String,
    pub generating_office: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventionTitle {
    pub lang: String,
    pub title: String,
}

/// A patent citation in epodoc format. Missing name or date are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedPatent {
    pub doc_number: String,
    pub name: String,
    pub date: String,
}

/// One exchange document from the biblio search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiblioRecord {
    pub query_country: String,
    pub query_industry: String,
    pub query_division: String,
    pub document_system: String,
    pub document_family_id: String,
    pub document_country: String,
    #[serde(rename = "document_doc-number")]
    pub document_doc_number: String,
    pub document_kind: String,
    /// Publication date as `YYYYMMDD`
    pub document_date: String,
    pub patent_classifications: Vec<Classification>,
    #[serde(rename = "application-reference")]
    pub application_reference: serde_json::Value,
    #[serde(rename = "priority-claims")]
    pub priority_claims: serde_json::Value,
    pub applicants: Vec<String>,
    /// `None` when the document lists no inventors at all
    pub inventors: Option<Vec<String>>,
    #[serde(rename = "invention-title")]
    pub invention_title: Vec<InventionTitle>,
    /// `None` when the document has no citation section
    pub references_cited: Option<Vec<CitedPatent>>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl BiblioRecord {
    /// country + doc number + kind
    pub fn publication_number(&self) -> String {
        format!(
            "{}{}{}",
            self.document_country, self.document_doc_number, self.document_kind
        )
    }
}

/// A raw biblio response stored together with its plan coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiblioEnvelope {
    pub country: String,
    pub industry: String,
    pub division: String,
    pub query: String,
    pub range_begin: u32,
    pub range_end: u32,
    pub response: serde_json::Value,
}
