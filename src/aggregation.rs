//! Combines classified tables, or failing that raw page text, into one
//! rent-roll summary and one T12 summary per document set.
//!
//! Each summary is produced by an ordered chain of [`ExtractionTier`]s.
//! Structured tables are always tried first; the text tiers follow in the
//! order configured by [`PipelineConfig::fallback_order`]. The first tier
//! that yields a non-empty summary wins.

use crate::config::{FallbackTier, PipelineConfig};
use crate::ingestion::TextSource;
use crate::matcher::{first_match, ColumnField, LineItem};
use crate::schema::{CellValue, RentRollSummary, T12Summary, Table};
use crate::text_parsers::{
    parse_rent_roll_summary_text, parse_rent_roll_text, parse_t12_summary_text, scan_t12_lines,
    summarize_t12_lines, DebugSink, NoopDebugSink,
};
use crate::utils::to_number;
use log::{debug, info, warn};
use once_cell::unsync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    StructuredTables,
    LineHeuristic,
    LabeledSummary,
}

impl From<FallbackTier> for ExtractionTier {
    fn from(tier: FallbackTier) -> Self {
        match tier {
            FallbackTier::LineHeuristic => ExtractionTier::LineHeuristic,
            FallbackTier::LabeledSummary => ExtractionTier::LabeledSummary,
        }
    }
}

/// Page texts of the fallback sources, read at most once each and only
/// when a text tier actually needs them.
struct SourcePages<'s> {
    text_source: &'s dyn TextSource,
    entries: Vec<(&'s str, OnceCell<Option<Vec<String>>>)>,
}

impl<'s> SourcePages<'s> {
    fn new<S: AsRef<str>>(text_source: &'s dyn TextSource, sources: &'s [S]) -> Self {
        Self {
            text_source,
            entries: sources
                .iter()
                .map(|s| (s.as_ref(), OnceCell::new()))
                .collect(),
        }
    }

    /// Readable sources in order. Unreadable ones are logged and skipped.
    fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.entries.iter().filter_map(move |(source_id, cell)| {
            cell.get_or_init(|| match self.text_source.page_texts(source_id) {
                Ok(pages) => Some(pages),
                Err(e) => {
                    warn!("Skipping fallback source {}: {}", source_id, e);
                    None
                }
            })
            .as_deref()
            .map(|pages| (*source_id, pages))
        })
    }
}

pub struct Aggregator<'a> {
    config: &'a PipelineConfig,
    text_source: &'a dyn TextSource,
    debug_sink: &'a dyn DebugSink,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a PipelineConfig, text_source: &'a dyn TextSource) -> Self {
        Self {
            config,
            text_source,
            debug_sink: &NoopDebugSink,
        }
    }

    pub fn with_debug_sink(mut self, debug_sink: &'a dyn DebugSink) -> Self {
        self.debug_sink = debug_sink;
        self
    }

    pub fn tiers(&self) -> Vec<ExtractionTier> {
        std::iter::once(ExtractionTier::StructuredTables)
            .chain(self.config.fallback_order.iter().copied().map(Into::into))
            .collect()
    }

    pub fn rent_roll<S: AsRef<str>>(&self, tables: &[Table], fallback_sources: &[S]) -> RentRollSummary {
        let pages = SourcePages::new(self.text_source, fallback_sources);

        for tier in self.tiers() {
            let summary = match tier {
                ExtractionTier::StructuredTables => rent_roll_from_tables(tables),
                ExtractionTier::LineHeuristic => self.rent_roll_from_lines(&pages),
                ExtractionTier::LabeledSummary => pages
                    .iter()
                    .map(|(_, p)| parse_rent_roll_summary_text(p))
                    .find(|s| !s.is_empty()),
            };
            if let Some(summary) = summary.filter(|s| !s.is_empty()) {
                info!("Rent roll summary produced by {:?} tier", tier);
                return summary;
            }
        }

        info!("No rent roll data found in tables or {} fallback sources", fallback_sources.len());
        RentRollSummary::default()
    }

    pub fn t12<S: AsRef<str>>(&self, tables: &[Table], fallback_sources: &[S]) -> T12Summary {
        let pages = SourcePages::new(self.text_source, fallback_sources);

        for tier in self.tiers() {
            let summary = match tier {
                ExtractionTier::StructuredTables => t12_from_tables(tables),
                ExtractionTier::LineHeuristic => self.t12_from_lines(&pages),
                ExtractionTier::LabeledSummary => pages
                    .iter()
                    .map(|(_, p)| parse_t12_summary_text(p))
                    .find(|s| !s.is_empty()),
            };
            if let Some(summary) = summary.filter(|s| !s.is_empty()) {
                info!("T12 summary produced by {:?} tier", tier);
                return summary;
            }
        }

        info!("No T12 data found in tables or {} fallback sources", fallback_sources.len());
        T12Summary::default()
    }

    fn rent_roll_from_lines(&self, pages: &SourcePages<'_>) -> Option<RentRollSummary> {
        let min_amount = self.config.rent_roll_min_reliable_amount;
        for (source_id, texts) in pages.iter() {
            let candidates = parse_rent_roll_text(texts);
            self.debug_sink.rent_roll_candidates(source_id, &candidates);
            if candidates.is_empty() {
                continue;
            }

            let current: f64 = candidates
                .iter()
                .filter_map(|c| c.best_amount)
                .filter(|amount| *amount > min_amount)
                .sum();
            debug!(
                "{}: {} rent roll candidates, current rent total {}",
                source_id,
                candidates.len(),
                current
            );
            return Some(RentRollSummary::from_totals(
                Some(candidates.len() as u64),
                current,
                0.0,
            ));
        }
        None
    }

    fn t12_from_lines(&self, pages: &SourcePages<'_>) -> Option<T12Summary> {
        pages.iter().find_map(|(source_id, texts)| {
            let lines = scan_t12_lines(texts);
            self.debug_sink.t12_lines(source_id, &lines);
            Some(summarize_t12_lines(&lines)).filter(|s| !s.is_empty())
        })
    }
}

/// Rent-roll summary with the default configuration and no debug output.
pub fn aggregate_rent_roll<S: AsRef<str>>(
    tables: &[Table],
    fallback_sources: &[S],
    text_source: &dyn TextSource,
) -> RentRollSummary {
    let config = PipelineConfig::default();
    Aggregator::new(&config, text_source).rent_roll(tables, fallback_sources)
}

/// T12 summary with the default configuration and no debug output.
pub fn aggregate_t12<S: AsRef<str>>(
    tables: &[Table],
    fallback_sources: &[S],
    text_source: &dyn TextSource,
) -> T12Summary {
    let config = PipelineConfig::default();
    Aggregator::new(&config, text_source).t12(tables, fallback_sources)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RentRollTotals {
    units: u64,
    current: f64,
    market: f64,
}

fn rent_roll_from_tables(tables: &[Table]) -> Option<RentRollSummary> {
    if tables.is_empty() {
        return None;
    }

    // Per-table work is independent; the sum stays sequential so the result
    // does not depend on how rayon split the input.
    let per_table: Vec<RentRollTotals> = tables.par_iter().map(rent_roll_table_totals).collect();
    let totals = per_table.iter().fold(RentRollTotals::default(), |acc, t| RentRollTotals {
        units: acc.units + t.units,
        current: acc.current + t.current,
        market: acc.market + t.market,
    });

    Some(RentRollSummary::from_totals(
        Some(totals.units).filter(|u| *u > 0),
        totals.current,
        totals.market,
    ))
}

fn column_sum(table: &Table, column: &str) -> f64 {
    table.column_values(column).filter_map(to_number).sum()
}

fn rent_roll_table_totals(table: &Table) -> RentRollTotals {
    let columns = &table.columns;
    let market_col = first_match(columns, ColumnField::MarketRent);
    let psf_col = first_match(columns, ColumnField::Psf);

    // "Market Rent" and "Rent PSF" also match the generic rent patterns.
    let excluded = [market_col, psf_col];
    let rent_candidates: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !excluded.contains(&Some(*c)))
        .collect();
    let rent_col = first_match(&rent_candidates, ColumnField::Rent);

    let area_candidates: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| Some(*c) != psf_col)
        .collect();
    let area_col = first_match(&area_candidates, ColumnField::Area);

    debug!(
        "Rent roll columns: rent={:?} market={:?} psf={:?} area={:?}",
        rent_col, market_col, psf_col, area_col
    );

    let current = rent_col.map(|c| column_sum(table, c)).unwrap_or(0.0);
    let market = match (market_col, psf_col, area_col) {
        (Some(market), _, _) => column_sum(table, market),
        (None, Some(psf), Some(area)) => {
            let factor = if ColumnField::MonthlyRate.pattern_set().is_match(psf) {
                12.0
            } else {
                1.0
            };
            table
                .column_values(psf)
                .zip(table.column_values(area))
                .filter_map(|(p, a)| Some(to_number(p)? * to_number(a)? * factor))
                .sum()
        }
        _ => 0.0,
    };

    RentRollTotals {
        units: table.row_count() as u64,
        current,
        market,
    }
}

/// Stacks tables into one, aligning cells by column name.
fn concat_tables(tables: &[Table]) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for column in &table.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    let mut merged = Table::new(columns.iter().cloned());
    for table in tables {
        let positions: Vec<Option<usize>> =
            columns.iter().map(|c| table.column_index(c)).collect();
        for row in &table.rows {
            let cells = positions
                .iter()
                .map(|pos| pos.and_then(|i| row.get(i)).cloned().unwrap_or_default());
            merged.push_row(cells.collect::<Vec<CellValue>>());
        }
    }
    merged
}

/// The most recent figure column: the last numeric column whose header looks
/// like a period or total, else the last numeric column.
fn pick_value_column<'t>(table: &'t Table, item_col: &str) -> Option<&'t str> {
    let numeric: Vec<&str> = table
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| *c != item_col)
        .filter(|c| table.column_values(c).any(|v| to_number(v).is_some()))
        .collect();

    let recent = ColumnField::RecentPeriod.pattern_set();
    numeric
        .iter()
        .rev()
        .find(|c| recent.is_match(c))
        .or_else(|| numeric.last())
        .copied()
}

fn t12_from_tables(tables: &[Table]) -> Option<T12Summary> {
    if tables.is_empty() {
        return None;
    }

    let merged = concat_tables(tables);
    let item_col = first_match(&merged.columns, ColumnField::LineItemLabel)
        .or_else(|| merged.columns.first().map(String::as_str))?;
    let Some(value_col) = pick_value_column(&merged, item_col) else {
        debug!("T12 tables have no numeric column besides {:?}", item_col);
        return None;
    };
    debug!("T12 columns: item={:?} value={:?}", item_col, value_col);

    let labels: Vec<String> = merged.column_values(item_col).map(CellValue::as_text).collect();
    let values: Vec<Option<f64>> = merged.column_values(value_col).map(to_number).collect();

    // `None` unless some labelled row carries a number; blank cells are not zeros.
    let sum_like = |item: LineItem| -> Option<f64> {
        let patterns = item.table_patterns()?;
        let matched: Vec<f64> = labels
            .iter()
            .zip(&values)
            .filter(|(label, _)| patterns.is_match(label))
            .filter_map(|(_, value)| *value)
            .collect();
        (!matched.is_empty()).then(|| matched.iter().sum())
    };

    let gpr = sum_like(LineItem::GrossPotentialRent);
    let vacancy = sum_like(LineItem::Vacancy);
    let other_income = sum_like(LineItem::OtherIncome);
    let opex = sum_like(LineItem::OperatingExpenses);

    let egi = gpr
        .filter(|g| *g != 0.0)
        .map(|g| g + other_income.unwrap_or(0.0) - vacancy.map(f64::abs).unwrap_or(0.0));
    let noi = match (egi, opex) {
        (Some(e), Some(o)) if e != 0.0 && o != 0.0 => Some(e - o),
        _ => None,
    };

    Some(T12Summary {
        gross_potential_rent: gpr,
        vacancy,
        other_income: None,
        effective_gross_income: egi,
        operating_expenses: opex,
        net_operating_income: noi,
    })
}
