//! # CRE Underwriting
//!
//! A library for turning loosely-structured commercial real-estate documents
//! (rent rolls, T12 operating statements, offering memoranda) into
//! standardized summaries and underwriting metrics.
//!
//! ## Core Concepts
//!
//! - **Tables**: Already-loaded tabular data with arbitrary, vendor-specific column names
//! - **Classification**: Keyword-density scoring labels each table `rent_roll`, `t12` or `other`
//! - **Field Matching**: Ranked regex vocabularies resolve which column holds rent, market rent, PSF, area
//! - **Fallback Tiers**: Structured tables → line heuristics over page text → labeled-summary regexes
//! - **Metrics**: Cap rate, DSCR, cash-on-cash, 5-year IRR, rent gap and break-even occupancy,
//!   with caller overrides taking strict precedence and every ratio computed by safe division
//!
//! Nothing here performs network I/O or model inference. Page text is read
//! through an injected [`TextSource`]; narrative facts come from a
//! [`NarrativeExtractor`] supplied by the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cre_underwriting::*;
//!
//! let t12 = Table::new(["Income & Expenses", "Total"])
//!     .with_row(["Gross Potential Rent", "500,000"])
//!     .with_row(["Vacancy", "25,000"])
//!     .with_row(["Operating Expenses", "150,000"]);
//!
//! let documents = vec![Document::from_table("t12.xlsx", t12)];
//! let overrides = Overrides::new().with("purchase_price", 4_500_000);
//!
//! let report = run_underwriting(&documents, &NarrativeFields::default(), &overrides);
//! println!("{}", report.to_json().unwrap());
//! ```

pub mod aggregation;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod matcher;
pub mod metrics;
pub mod narrative;
pub mod overrides;
pub mod report;
pub mod schema;
pub mod text_parsers;
pub mod utils;

pub use aggregation::{aggregate_rent_roll, aggregate_t12, Aggregator, ExtractionTier};
pub use classifier::{classify_table, classify_tables, clean_table, TableClassifier, Vocabulary};
pub use config::{ClassificationConfig, FallbackTier, PipelineConfig};
pub use error::{Result, UnderwritingError};
pub use ingestion::*;
pub use matcher::{first_match, ColumnField, LineItem, PatternSet};
pub use metrics::{compute_irr, compute_metrics, compute_metrics_with, Assumptions};
pub use narrative::{
    extract_sqft_value, parse_narrative_response, NarrativeConfig, NarrativeExtractor,
    NarrativeFields,
};
pub use overrides::Overrides;
pub use report::{QuickSummary, UnderwritingPipeline, UnderwritingReport};
pub use schema::*;
pub use text_parsers::{
    parse_rent_roll_summary_text, parse_rent_roll_text, parse_t12_summary_text, parse_t12_text,
    DebugSink, JsonDebugSink, NoopDebugSink, RentRollCandidate, T12CandidateLine,
};
pub use utils::*;

/// Runs the whole pipeline with the default configuration.
pub fn run_underwriting(
    documents: &[Document],
    narrative: &NarrativeFields,
    overrides: &Overrides,
) -> UnderwritingReport {
    UnderwritingPipeline::default().run(documents, narrative, overrides)
}
