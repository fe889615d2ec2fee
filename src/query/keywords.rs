//! Keyword tables derived from the NACE classification.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use crate::ops::OpsError;

/// Fragments replaced by a space before text is split into keywords
const NOISE_FRAGMENTS: &[&str] = &[
    "n.e.c.", "(", ")", ", ", ". ", "? ", " of ", " and ", "/", " to ", " in ", " other ", "; ",
    " for ", " - ", " as ", " own ", " use ",
];

/// Lower-case `text`, blank out noise fragments and collapse whitespace.
pub fn normalize(text: &str) -> String {
    // Pad so fragments anchored on spaces also match at either end
    let mut element = format!(" {} ", text.to_lowercase());
    for fragment in NOISE_FRAGMENTS {
        // Adjacent stopwords share a space, so one pass can miss the second
        while element.contains(fragment) {
            element = element.replace(fragment, " ");
        }
    }
    element.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One row of the NACE code table, after forward-filling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaceActivity {
    pub section: String,
    pub division: String,
    pub activity: String,
}

#[derive(Debug, Deserialize)]
struct NaceRow {
    #[serde(rename = "Section", default)]
    section: Option<String>,
    #[serde(rename = "Division", default)]
    division: Option<String>,
    #[serde(rename = "Activity", default)]
    activity: Option<String>,
}

/// Load the NACE code table from a CSV file with `Section`, `Division` and
/// `Activity` columns.
pub fn load_nace_csv(path: &Path) -> Result<Vec<NaceActivity>, OpsError> {
    let file = std::fs::File::open(path)?;
    read_nace(file)
}

/// Read the NACE table. Blank `Section`/`Division` cells inherit the value
/// of the row above; rows without an activity are dropped.
pub fn read_nace<R: io::Read>(reader: R) -> Result<Vec<NaceActivity>, OpsError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut section = None::<String>;
    let mut division = None::<String>;
    let mut activities = Vec::new();

    for (idx, row) in reader.deserialize::<NaceRow>().enumerate() {
        let row = row?;
        if let Some(s) = row.section.filter(|s| !s.trim().is_empty()) {
            section = Some(s.trim().to_string());
        }
        if let Some(d) = row.division.filter(|d| !d.trim().is_empty()) {
            division = Some(d.trim().to_string());
        }

        let Some(activity) = row.activity.filter(|a| !a.trim().is_empty()) else {
            continue;
        };
        match (&section, &division) {
            (Some(section), Some(division)) => activities.push(NaceActivity {
                section: section.clone(),
                division: division.clone(),
                activity,
            }),
            _ => tracing::debug!("NACE row {} has no section/division yet, skipped", idx + 1),
        }
    }

    Ok(activities)
}

/// Normalized keywords per industry (section) and per division.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTables {
    /// Section -> normalized industry descriptions (mandatory title terms)
    pub industry_keywords: BTreeMap<String, Vec<String>>,
    /// Division -> distinct single-word activity keywords
    pub division_keywords: BTreeMap<String, BTreeSet<String>>,
    /// Division -> owning section
    pub division_industry: BTreeMap<String, String>,
}

impl KeywordTables {
    pub fn build(industries: &BTreeMap<String, Vec<String>>, activities: &[NaceActivity]) -> Self {
        let industry_keywords = industries
            .iter()
            .map(|(section, descriptions)| {
                let keywords = descriptions
                    .iter()
                    .map(|d| normalize(d))
                    .filter(|k| !k.is_empty())
                    .collect();
                (section.clone(), keywords)
            })
            .collect();

        let mut division_text: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        let mut division_industry = BTreeMap::new();
        for row in activities {
            division_text
                .entry(row.division.clone())
                .or_default()
                .push(row.activity.as_str());
            division_industry
                .entry(row.division.clone())
                .or_insert_with(|| row.section.clone());
        }

        let division_keywords = division_text
            .into_iter()
            .map(|(division, texts)| {
                let words = normalize(&texts.join(" "))
                    .split(' ')
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
                    .collect();
                (division, words)
            })
            .collect();

        Self {
            industry_keywords,
            division_keywords,
            division_industry,
        }
    }

    /// Divisions belonging to `industry`, in code order
    pub fn divisions_of(&self, industry: &str) -> Vec<&str> {
        self.division_industry
            .iter()
            .filter(|(_, section)| section.as_str() == industry)
            .map(|(division, _)| division.as_str())
            .collect()
    }

    /// Sections that own at least one division
    pub fn industries(&self) -> BTreeSet<&str> {
        self.division_industry.values().map(String::as_str).collect()
    }
}
