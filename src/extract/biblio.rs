//! Exchange documents from the `published-data/search/biblio` service.

use serde_json::Value;

use super::{at, dollar_at, one_or_many, text, text_at, BIBLIO_SEARCH, SEARCH_RESULT, WORLD_PATENT_DATA};
use crate::models::{BiblioEnvelope, BiblioRecord, CitedPatent, Classification, InventionTitle, SearchContext};
use crate::ops::{OpsError, OpsResponse};

const TITLE_LANGUAGES: [&str; 2] = ["en", "de"];

/// Flatten a biblio-search response. `Ok(None)` when nothing matched.
pub fn extract_biblio(
    response: &OpsResponse,
    context: &SearchContext,
) -> Result<Option<Vec<BiblioRecord>>, OpsError> {
    if response.is_entity_not_found() {
        return Ok(None);
    }
    extract_biblio_json(&response.json()?, context).map(Some)
}

/// Flatten previously stored biblio responses.
pub fn extract_biblio_envelopes(envelopes: &[BiblioEnvelope]) -> Result<Vec<BiblioRecord>, OpsError> {
    let mut records = Vec::new();
    for envelope in envelopes {
        let context = SearchContext {
            country: envelope.country.clone(),
            industry: envelope.industry.clone(),
            division: envelope.division.clone(),
            query: envelope.query.clone(),
            range_begin: envelope.range_begin,
            range_end: envelope.range_end,
        };
        records.extend(extract_biblio_json(&envelope.response, &context)?);
    }
    Ok(records)
}

/// Flatten a decoded biblio-search document.
pub fn extract_biblio_json(json: &Value, context: &SearchContext) -> Result<Vec<BiblioRecord>, OpsError> {
    let documents = at(
        json,
        &[WORLD_PATENT_DATA, BIBLIO_SEARCH, SEARCH_RESULT, "exchange-documents"],
    )?;

    let mut records = Vec::new();
    for document in one_or_many(documents) {
        match exchange_document(document, context) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping exchange document in '{}': {}", context.query, e),
        }
    }
    Ok(records)
}

fn exchange_document(wrapper: &Value, context: &SearchContext) -> Result<BiblioRecord, OpsError> {
    let element = at(wrapper, &["exchange-document"])?;
    let biblio = at(element, &["bibliographic-data"])?;

    let publication_ids = one_or_many(at(biblio, &["publication-reference", "document-id"])?);
    let document_date = publication_ids
        .first()
        .ok_or_else(|| OpsError::MalformedResponse("empty publication-reference".to_string()))
        .and_then(|id| dollar_at(id, &["date"]))?;

    Ok(BiblioRecord {
        query_country: context.country.clone(),
        query_industry: context.industry.clone(),
        query_division: context.division.clone(),
        document_system: text_at(element, &["@system"])?,
        document_family_id: text_at(element, &["@family-id"])?,
        document_country: text_at(element, &["@country"])?,
        document_doc_number: text_at(element, &["@doc-number"])?,
        document_kind: text_at(element, &["@kind"])?,
        document_date,
        patent_classifications: classifications(biblio)?,
        application_reference: at(biblio, &["application-reference"])?.clone(),
        priority_claims: at(biblio, &["priority-claims"])?.clone(),
        applicants: original_names(at(biblio, &["parties", "applicants", "applicant"])?, "applicant-name")?,
        inventors: match at(biblio, &["parties"])?.get("inventors") {
            Some(inventors) => Some(original_names(at(inventors, &["inventor"])?, "inventor-name")?),
            None => None,
        },
        invention_title: invention_titles(at(biblio, &["invention-title"])?)?,
        references_cited: match biblio.get("references-cited") {
            Some(cited) => Some(cited_patents(cited)?),
            None => None,
        },
        abstract_text: english_abstract(element),
    })
}

fn classifications(biblio: &Value) -> Result<Vec<Classification>, OpsError> {
    one_or_many(at(biblio, &["patent-classifications", "patent-classification"])?)
        .into_iter()
        .map(|entry| -> Result<Classification, OpsError> {
            Ok(Classification {
                office: text_at(entry, &["classification-scheme", "@office"])?,
                section: dollar_at(entry, &["section"])?,
                class: dollar_at(entry, &["class"])?,
                subclass: dollar_at(entry, &["subclass"])?,
                main_group: dollar_at(entry, &["main-group"])?,
                subgroup: dollar_at(entry, &["subgroup"])?,
                value: dollar_at(entry, &["classification-value"])?,
                generating_office: dollar_at(entry, &["generating-office"])?,
            })
        })
        .collect()
}

/// Names in "original" data format; the epodoc duplicates are dropped.
fn original_names(parties: &Value, name_key: &str) -> Result<Vec<String>, OpsError> {
    let mut names = Vec::new();
    for party in one_or_many(parties) {
        if party.get("@data-format").and_then(Value::as_str) == Some("original") {
            names.push(dollar_at(party, &[name_key, "name"])?);
        }
    }
    Ok(names)
}

fn invention_titles(titles: &Value) -> Result<Vec<InventionTitle>, OpsError> {
    let mut out = Vec::new();
    for title in one_or_many(titles) {
        let lang = text_at(title, &["@lang"])?;
        if TITLE_LANGUAGES.contains(&lang.as_str()) {
            out.push(InventionTitle {
                lang,
                title: text_at(title, &["$"])?,
            });
        }
    }
    Ok(out)
}

/// Patent citations whose document id is in epodoc format.
fn cited_patents(cited: &Value) -> Result<Vec<CitedPatent>, OpsError> {
    let mut out = Vec::new();
    for citation in one_or_many(at(cited, &["citation"])?) {
        let Some(patcit) = citation.get("patcit") else {
            continue;
        };
        for id in one_or_many(at(patcit, &["document-id"])?) {
            if id.get("@document-id-type").and_then(Value::as_str) != Some("epodoc") {
                continue;
            }
            out.push(CitedPatent {
                doc_number: dollar_at(id, &["doc-number"])?,
                name: dollar_at(id, &["name"]).unwrap_or_default(),
                date: dollar_at(id, &["date"]).unwrap_or_default(),
            });
        }
    }
    Ok(out)
}

fn english_abstract(element: &Value) -> Option<String> {
    let abstracts = element.get("abstract")?;
    one_or_many(abstracts)
        .into_iter()
        .find(|a| a.get("@lang").and_then(Value::as_str) == Some("en"))
        .and_then(|a| a.get("p"))
        .and_then(|p| one_or_many(p).into_iter().next())
        .and_then(|p| p.get("$"))
        .and_then(text)
}
