//! Core data models for flattened patent records.

mod records;

pub use records::{
    BiblioEnvelope, BiblioRecord, CitedPatent, Classification, InventionTitle, SearchContext,
    SearchRecord,
};
