//! OPS CQL query construction.
//!
//! Each query has the shape
//!
//! ```text
//! (ta ALL "industry kw" OR ta ALL "...") AND (ta = "kw1" OR ta = "kw2") AND cpc any "Y02A Y02E" AND AP="DE"
//! ```
//!
//! OPS refuses queries with more than 20 terms or more than 10 repetitions
//! of the same field qualifier, so division keywords are split into chunks
//! and every chunk becomes its own query.

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::KeywordTables;
use crate::ops::OpsError;

/// Term and qualifier ceilings imposed by OPS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_terms: usize,
    pub max_field_repeats: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_terms: 20,
            max_field_repeats: 10,
        }
    }
}

/// Mandatory industry clause: every industry keyword as a title match.
pub fn industry_clause(keywords: &[String]) -> String {
    let terms: Vec<String> = keywords.iter().map(|k| format!("ta ALL \"{}\"", k)).collect();
    format!("({})", terms.join(" OR "))
}

/// OR-joined exact title terms for one chunk of division keywords.
pub fn keyword_clause<S: AsRef<str>>(keywords: &[S]) -> String {
    keywords
        .iter()
        .map(|k| format!("ta = \"{}\"", k.as_ref()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Number of division keywords that fit next to the industry clause.
///
/// The smaller of the qualifier headroom and the term headroom (one term
/// kept in reserve), never less than one.
pub fn chunk_size(industry_keywords: &[String], fixed_terms: usize, limits: QueryLimits) -> usize {
    let industry_words: usize = industry_keywords
        .iter()
        .map(|k| k.split_whitespace().count())
        .sum();

    let by_qualifier = limits.max_field_repeats.saturating_sub(industry_keywords.len());
    let by_terms = limits
        .max_terms
        .saturating_sub(1)
        .saturating_sub(industry_words)
        .saturating_sub(fixed_terms);

    let step = by_qualifier.min(by_terms);
    if step == 0 {
        tracing::warn!(
            "Industry clause ({} keywords, {} words) exhausts the query budget; using one keyword per query",
            industry_keywords.len(),
            industry_words
        );
    }
    step.max(1)
}

/// Join the clauses into one query string.
pub fn assemble(industry_clause: &str, keyword_clause: &str, cpc_codes: &[String], country: &str) -> String {
    format!(
        "{} AND ({}) AND cpc any \"{}\" AND AP=\"{}\"",
        industry_clause,
        keyword_clause,
        cpc_codes.join(" "),
        country
    )
}

/// Number of words inside double-quoted phrases, which is how OPS counts terms.
pub fn count_quoted_words(query: &str) -> usize {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    let re = QUOTED.get_or_init(|| Regex::new(r#""(.*?)""#).expect("valid regex"));
    re.captures_iter(query)
        .map(|c| c[1].split_whitespace().count())
        .sum()
}

/// Occurrences of a field qualifier (e.g. `ta`) outside quoted phrases.
pub fn count_field_qualifier(query: &str, qualifier: &str) -> usize {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    let re = QUOTED.get_or_init(|| Regex::new(r#""[^"]*""#).expect("valid regex"));
    re.replace_all(query, "\"\"")
        .split_whitespace()
        .filter(|token| token.trim_start_matches('(') == qualifier)
        .count()
}

/// A query together with its coordinates in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedQuery<'a> {
    pub country: &'a str,
    pub industry: &'a str,
    pub division: &'a str,
    pub query: &'a str,
}

/// country -> industry -> division -> alternative queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryPlan(BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>);

impl QueryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, country: &str, industry: &str, division: &str, queries: Vec<String>) {
        self.0
            .entry(country.to_string())
            .or_default()
            .entry(industry.to_string())
            .or_default()
            .insert(division.to_string(), queries);
    }

    pub fn get(&self, country: &str, industry: &str, division: &str) -> Option<&[String]> {
        self.0
            .get(country)?
            .get(industry)?
            .get(division)
            .map(Vec::as_slice)
    }

    /// Every query in country, industry, division order
    pub fn iter(&self) -> impl Iterator<Item = PlannedQuery<'_>> {
        self.0.iter().flat_map(|(country, industries)| {
            industries.iter().flat_map(move |(industry, divisions)| {
                divisions.iter().flat_map(move |(division, queries)| {
                    queries.iter().map(move |query| PlannedQuery {
                        country,
                        industry,
                        division,
                        query,
                    })
                })
            })
        })
    }

    /// Every query string, flattened
    pub fn all_queries(&self) -> Vec<&str> {
        self.iter().map(|q| q.query).collect()
    }

    /// Total number of queries
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the given countries (all when empty)
    pub fn retain_countries(&mut self, countries: &[String]) {
        if !countries.is_empty() {
            self.0.retain(|country, _| countries.iter().any(|c| c.eq_ignore_ascii_case(country)));
        }
    }

    /// Write the plan into `dir` under a dated file name
    pub fn save(&self, dir: &Path) -> Result<PathBuf, OpsError> {
        let path = dir.join(plan_filename(Local::now().date_naive()));
        self.save_as(&path)?;
        Ok(path)
    }

    pub fn save_as(&self, path: &Path) -> Result<(), OpsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, OpsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// `YYYY-MM-DD_ops_search_queries.json`
pub fn plan_filename(date: NaiveDate) -> String {
    format!("{}_ops_search_queries.json", date.format("%Y-%m-%d"))
}

/// Builds a [`QueryPlan`] from keyword tables and the fixed query terms.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    cpc_codes: Vec<String>,
    countries: Vec<String>,
    limits: QueryLimits,
}

impl QueryBuilder {
    pub fn new(cpc_codes: Vec<String>, countries: Vec<String>) -> Self {
        Self {
            cpc_codes,
            countries,
            limits: QueryLimits::default(),
        }
    }

    pub fn limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// CPC codes plus the applicant country
    pub fn fixed_terms(&self) -> usize {
        self.cpc_codes.len() + 1
    }

    /// Keyword clauses for one division, one per chunk. Empty when the
    /// division has no keywords.
    pub fn division_clauses(&self, industry_keywords: &[String], division_keywords: &[&str]) -> Vec<String> {
        let step = chunk_size(industry_keywords, self.fixed_terms(), self.limits);
        division_keywords
            .chunks(step)
            .map(keyword_clause)
            .collect()
    }

    pub fn build(&self, tables: &KeywordTables) -> QueryPlan {
        let mut plan = QueryPlan::new();

        for industry in tables.industries() {
            let Some(industry_keywords) = tables.industry_keywords.get(industry) else {
                tracing::warn!("No industry keywords configured for section {}, skipped", industry);
                continue;
            };
            let clause = industry_clause(industry_keywords);

            for division in tables.divisions_of(industry) {
                let keywords: Vec<&str> = tables
                    .division_keywords
                    .get(division)
                    .map(|set| set.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                let keyword_clauses = self.division_clauses(industry_keywords, &keywords);
                if keyword_clauses.is_empty() {
                    tracing::debug!("Division {} has no keywords, skipped", division);
                    continue;
                }

                for country in &self.countries {
                    let queries = keyword_clauses
                        .iter()
                        .map(|kw| assemble(&clause, kw, &self.cpc_codes, country))
                        .collect();
                    plan.insert(country, industry, division, queries);
                }
            }
        }

        plan
    }
}

/// Plan every query for `countries` with default limits.
pub fn build_plan(tables: &KeywordTables, cpc_codes: &[String], countries: &[String]) -> QueryPlan {
    QueryBuilder::new(cpc_codes.to_vec(), countries.to_vec()).build(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::NaceActivity;
    use tempfile::tempdir;

    fn activity(section: &str, division: &str, text: &str) -> NaceActivity {
        NaceActivity {
            section: section.to_string(),
            division: division.to_string(),
            activity: text.to_string(),
        }
    }

    fn tables() -> KeywordTables {
        let mut industries = BTreeMap::new();
        industries.insert(
            "C".to_string(),
            vec!["Manufacturing".to_string(), "Industrial production".to_string()],
        );
        industries.insert("D".to_string(), vec!["Electricity supply".to_string()]);

        let activities = vec![
            activity("C", "10", "Processing and preserving of meat"),
            activity("C", "10", "Processing and preserving of fish, crustaceans and molluscs"),
            activity("C", "10", "Manufacture of vegetable and animal oils and fats"),
            activity("C", "10", "Manufacture of dairy products, bakery and farinaceous products"),
            activity("C", "11", "Manufacture of beverages"),
            activity("C", "12", "(n.e.c.)"),
            activity("D", "35", "Electric power generation, transmission and distribution"),
        ];
        KeywordTables::build(&industries, &activities)
    }

    fn cpc() -> Vec<String> {
        vec!["Y02A".to_string(), "Y02E".to_string(), "Y02P".to_string()]
    }

    #[test]
    fn test_industry_clause() {
        let clause = industry_clause(&["manufacturing".to_string(), "industrial production".to_string()]);
        assert_eq!(
            clause,
            "(ta ALL \"manufacturing\" OR ta ALL \"industrial production\")"
        );
    }

    #[test]
    fn test_assemble_shape() {
        let query = assemble("(ta ALL \"x\")", "ta = \"foo\"", &["Y02".to_string()], "DE");
        assert_eq!(
            query,
            "(ta ALL \"x\") AND (ta = \"foo\") AND cpc any \"Y02\" AND AP=\"DE\""
        );
    }

    #[test]
    fn test_chunk_size_takes_tighter_cap() {
        let limits = QueryLimits::default();
        // qualifier cap: 10 - 2 = 8; term cap: 19 - 3 - 4 = 12
        let industry = vec!["manufacturing".to_string(), "industrial production".to_string()];
        assert_eq!(chunk_size(&industry, 4, limits), 8);

        // term cap: 19 - 3 - 11 = 5
        assert_eq!(chunk_size(&industry, 11, limits), 5);
    }

    #[test]
    fn test_chunk_size_never_zero() {
        let industry: Vec<String> = (0..12).map(|i| format!("keyword number {}", i)).collect();
        assert_eq!(chunk_size(&industry, 4, QueryLimits::default()), 1);
    }

    #[test]
    fn test_generated_queries_respect_limits() {
        let builder = QueryBuilder::new(cpc(), vec!["DE".to_string(), "FR".to_string()]);
        let plan = builder.build(&tables());
        assert!(!plan.is_empty());

        for query in plan.all_queries() {
            assert!(count_quoted_words(query) <= 20, "too many terms: {}", query);
            assert!(count_field_qualifier(query, "ta") <= 10, "too many qualifiers: {}", query);
        }
    }

    #[test]
    fn test_long_industry_keywords_shrink_chunks_by_term_cap() {
        let mut industries = BTreeMap::new();
        industries.insert(
            "C".to_string(),
            vec![
                "Food processing machinery".to_string(),
                "Textile apparel leather goods".to_string(),
            ],
        );
        let activities = vec![
            activity("C", "13", "Spinning weaving finishing textiles"),
            activity("C", "13", "Knitted crocheted fabrics"),
            activity("C", "13", "Carpets rugs cordage twine netting"),
        ];
        let tables = KeywordTables::build(&industries, &activities);
        let cpc: Vec<String> = ["Y02A", "Y02B", "Y02C", "Y02E", "Y02P"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let builder = QueryBuilder::new(cpc, vec!["DE".to_string()]);

        // qualifier cap: 10 - 2 = 8; term cap: 19 - 7 - 6 = 6
        let step = chunk_size(&tables.industry_keywords["C"], builder.fixed_terms(), QueryLimits::default());
        assert_eq!(step, 6);

        let plan = builder.build(&tables);
        let queries = plan.get("DE", "C", "13").unwrap();
        assert_eq!(queries.len(), 2);
        for query in queries {
            assert_eq!(count_quoted_words(query), 19, "unexpected term count: {}", query);
            assert!(count_field_qualifier(query, "ta") <= 10, "too many qualifiers: {}", query);
        }
        for query in plan.all_queries() {
            assert!(count_quoted_words(query) <= 20, "too many terms: {}", query);
        }
    }

    #[test]
    fn test_division_chunks_cover_all_keywords() {
        let tables = tables();
        let builder = QueryBuilder::new(cpc(), vec!["DE".to_string()]);
        let plan = builder.build(&tables);

        let queries = plan.get("DE", "C", "10").unwrap();
        let expected = tables.division_keywords["10"].len();
        let covered: usize = queries
            .iter()
            .map(|q| count_field_qualifier(q, "ta") - 2)
            .sum();
        assert_eq!(covered, expected);
        assert!(queries.len() > 1);
        assert!(queries[0].ends_with("AND cpc any \"Y02A Y02E Y02P\" AND AP=\"DE\""));
    }

    #[test]
    fn test_division_without_keywords_is_skipped() {
        let plan = QueryBuilder::new(cpc(), vec!["DE".to_string()]).build(&tables());
        assert!(plan.get("DE", "C", "12").is_none());
        assert!(plan.get("DE", "C", "11").is_some());
        assert!(plan.get("DE", "D", "35").is_some());
    }

    #[test]
    fn test_industry_without_keywords_is_skipped() {
        let activities = vec![activity("Z", "99", "Mystery activities")];
        let tables = KeywordTables::build(&BTreeMap::new(), &activities);
        let plan = QueryBuilder::new(cpc(), vec!["DE".to_string()]).build(&tables);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_count_quoted_words() {
        let query = "(ta ALL \"industrial production\") AND (ta = \"meat\") AND cpc any \"Y02A Y02E\" AND AP=\"DE\"";
        assert_eq!(count_quoted_words(query), 6);
        assert_eq!(count_field_qualifier(query, "ta"), 2);
    }

    #[test]
    fn test_plan_file_round_trip() {
        let dir = tempdir().unwrap();
        let plan = QueryBuilder::new(cpc(), vec!["DE".to_string()]).build(&tables());

        let path = plan.save(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_ops_search_queries.json"));

        let loaded = QueryPlan::load(&path).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn test_plan_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(plan_filename(date), "2024-03-09_ops_search_queries.json");
    }

    #[test]
    fn test_retain_countries() {
        let mut plan = QueryBuilder::new(cpc(), vec!["DE".to_string(), "FR".to_string()]).build(&tables());
        plan.retain_countries(&["fr".to_string()]);
        assert!(plan.iter().all(|q| q.country == "FR"));
        assert!(!plan.is_empty());
    }
}
