//! Search query generation.
//!
//! NACE activity descriptions are normalized into keyword tables
//! (`keywords`), which are then combined with the configured CPC scheme
//! codes and applicant countries into a [`QueryPlan`] (`builder`).

mod builder;
mod keywords;

pub use builder::{
    assemble, build_plan, chunk_size, count_field_qualifier, count_quoted_words, industry_clause, keyword_clause,
    plan_filename, PlannedQuery, QueryBuilder, QueryLimits, QueryPlan,
};
pub use keywords::{load_nace_csv, normalize, read_nace, KeywordTables, NaceActivity};
