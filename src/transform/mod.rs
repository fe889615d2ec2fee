//! Patent panel preparation from flattened biblio records.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::ops::RangeInclusive;

use crate::models::BiblioRecord;
use crate::ops::OpsError;

/// Years covered by the economic statistics the counts are joined with
pub const PANEL_YEARS: RangeInclusive<i32> = 2011..=2020;
/// Industries with fewer distinct years are dropped from the panel
pub const MIN_YEARS: usize = 4;

/// A biblio record reduced to what the panel needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentRow {
    pub industry: String,
    pub document_id: String,
    pub year: i32,
    pub month: u32,
}

/// Patent count of one industry in one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryYearCount {
    pub industry: String,
    pub year: i32,
    pub sum_patents: usize,
}

/// Add publication number and publication year/month to a record.
///
/// Returns `None` when the document date is not a `YYYYMMDD` date.
pub fn enrich(record: &BiblioRecord) -> Option<PatentRow> {
    let date = match NaiveDate::parse_from_str(record.document_date.trim(), "%Y%m%d") {
        Ok(date) => date,
        Err(e) => {
            tracing::warn!(
                "Unparseable date '{}' on {}: {}",
                record.document_date,
                record.publication_number(),
                e
            );
            return None;
        }
    };

    Some(PatentRow {
        industry: record.query_industry.clone(),
        document_id: record.publication_number(),
        year: date.year(),
        month: date.month(),
    })
}

/// Enrich every record, dropping those without a usable date.
pub fn enrich_all(records: &[BiblioRecord]) -> Vec<PatentRow> {
    records.iter().filter_map(enrich).collect()
}

/// Count patents per industry and year.
///
/// A document counts once per industry, only years inside `years` are
/// kept, and industries with fewer than `min_years` distinct years are
/// dropped. Output is ordered by industry, then year.
pub fn prep_patents(
    rows: &[PatentRow],
    years: RangeInclusive<i32>,
    min_years: usize,
) -> Vec<IndustryYearCount> {
    let mut seen = HashSet::new();
    let mut counts: BTreeMap<(&str, i32), usize> = BTreeMap::new();

    for row in rows {
        if !seen.insert((row.industry.as_str(), row.document_id.as_str())) {
            continue;
        }
        if !years.contains(&row.year) {
            continue;
        }
        *counts.entry((row.industry.as_str(), row.year)).or_default() += 1;
    }

    let mut years_per_industry: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for (industry, year) in counts.keys() {
        years_per_industry.entry(*industry).or_default().insert(*year);
    }

    counts
        .into_iter()
        .filter(|((industry, _), _)| {
            years_per_industry
                .get(industry)
                .is_some_and(|years| years.len() >= min_years)
        })
        .map(|((industry, year), sum_patents)| IndustryYearCount {
            industry: industry.to_string(),
            year,
            sum_patents,
        })
        .collect()
}

/// Write counts as CSV with a header row.
pub fn write_counts_csv<W: io::Write>(writer: W, counts: &[IndustryYearCount]) -> Result<(), OpsError> {
    let mut writer = csv::Writer::from_writer(writer);
    for count in counts {
        writer.serialize(count)?;
    }
    writer.flush()?;
    Ok(())
}
