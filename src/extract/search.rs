//! Publication references from the `published-data/search` service.

use serde_json::Value;

use super::{at, dollar_at, one_or_many, text_at, total_result_count, BIBLIO_SEARCH, SEARCH_RESULT, WORLD_PATENT_DATA};
use crate::models::{SearchContext, SearchRecord};
use crate::ops::{OpsError, OpsResponse};

struct DocumentId {
    family_id: String,
    id_type: String,
    country: String,
    doc_number: String,
    kind: String,
}

fn document_id(reference: &Value) -> Result<DocumentId, OpsError> {
    Ok(DocumentId {
        family_id: text_at(reference, &["@family-id"])?,
        id_type: text_at(reference, &["document-id", "@document-id-type"])?,
        country: dollar_at(reference, &["document-id", "country"])?,
        doc_number: dollar_at(reference, &["document-id", "doc-number"])?,
        kind: dollar_at(reference, &["document-id", "kind"])?,
    })
}

/// Flatten a search response into one record per publication reference.
///
/// Returns `Ok(None)` when OPS reported that nothing matched, or when the
/// result list is neither an object nor an array.
pub fn extract_search(
    response: &OpsResponse,
    context: &SearchContext,
) -> Result<Option<Vec<SearchRecord>>, OpsError> {
    if response.is_entity_not_found() {
        return Ok(None);
    }

    let json = response.json()?;
    let total_results = total_result_count(&json)?;
    let references = at(
        &json,
        &[WORLD_PATENT_DATA, BIBLIO_SEARCH, SEARCH_RESULT, "ops:publication-reference"],
    )?;
    if !references.is_object() && !references.is_array() {
        return Ok(None);
    }

    let mut records = Vec::new();
    for reference in one_or_many(references) {
        let id = match document_id(reference) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Skipping publication reference in '{}': {}", context.query, e);
                continue;
            }
        };

        records.push(SearchRecord {
            header: response.headers.clone(),
            country: context.country.clone(),
            industry: context.industry.clone(),
            division: context.division.clone(),
            query: context.query.clone(),
            total_results,
            range_begin: context.range_begin,
            range_end: context.range_end,
            family_id: id.family_id,
            document_id_type: id.id_type,
            publication_number: format!("{}{}{}", id.country, id.doc_number, id.kind),
            document_id_country: id.country,
            document_id_doc_number: id.doc_number,
            document_id_kind: id.kind,
        });
    }

    Ok(Some(records))
}
