//! Best-effort extraction from raw page text, used when no structured table
//! of the needed class exists.
//!
//! Two families live here: line/window heuristics that recover candidate
//! tenant rows and T12 line items, and a literal `Label: value` extractor for
//! documents that only carry already-aggregated totals.

use crate::matcher::{t12_line_filter, LineItem, PatternSet};
use crate::schema::{RentRollSummary, T12Summary};
use crate::utils::{extract_amounts, parse_number};
use chrono::NaiveDate;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

static ANCHOR_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^suite\s*\d+|^\d{2,4}\b").expect("Failed to compile ANCHOR_START_RE"));

static ANCHOR_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:suite|ste)\b|#\s*\d").expect("Failed to compile ANCHOR_WORD_RE")
});

static AREA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{3,6}(?:\.\d+)?)\s?(?:sf\b|sq\.?\s?ft|s\.f\.)").expect("Failed to compile AREA_RE")
});

static LEASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)((?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[\w\.\-]*\s*-?\s*(\d{4}))")
        .expect("Failed to compile LEASE_RE")
});

static TENANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:suite|ste|#)?\s*\d{0,4}\s*[-:]*\s*([A-Z][A-Za-z0-9&,\.\- ]{2,80})")
        .expect("Failed to compile TENANT_RE")
});

/// Lines before and after an anchor that make up its context window.
const WINDOW_BEFORE: usize = 2;
const WINDOW_AFTER: usize = 3;

/// One tenant-row guess recovered from page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentRollCandidate {
    /// 1-based page number.
    pub page: usize,
    pub window: String,
    pub tenant: Option<String>,
    pub sqft: Option<f64>,
    pub amounts: Vec<f64>,
    pub lease_hint: Option<String>,
    pub lease_date: Option<NaiveDate>,
    /// Largest amount in the window.
    pub best_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T12CandidateLine {
    pub line: String,
    pub amounts: Vec<f64>,
}

fn is_row_anchor(line: &str) -> bool {
    let lower = line.to_lowercase();
    ANCHOR_START_RE.is_match(&lower) || ANCHOR_WORD_RE.is_match(&lower)
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Scans each page for suite/unit anchor lines and mines the surrounding
/// window for tenant name, area, lease date and amounts.
pub fn parse_rent_roll_text<S: AsRef<str>>(pages: &[S]) -> Vec<RentRollCandidate> {
    let mut candidates = Vec::new();

    for (page_idx, page) in pages.iter().enumerate() {
        let lines = non_empty_lines(page.as_ref());
        for (idx, line) in lines.iter().enumerate() {
            if !is_row_anchor(line) {
                continue;
            }
            let start = idx.saturating_sub(WINDOW_BEFORE);
            let end = (idx + WINDOW_AFTER + 1).min(lines.len());
            let window = lines[start..end].join(" | ");
            candidates.push(candidate_from_window(page_idx + 1, window));
        }
    }

    debug!("Rent roll text heuristic produced {} candidates", candidates.len());
    candidates
}

fn candidate_from_window(page: usize, window: String) -> RentRollCandidate {
    let amounts = extract_amounts(&window);

    let flattened = window.replace(',', "").to_lowercase();
    let sqft = AREA_RE
        .captures(&flattened)
        .and_then(|c| parse_number(&c[1]));

    let (lease_hint, lease_date) = match LEASE_RE.captures(&window) {
        Some(c) => {
            let hint = c[1].to_string();
            let date = parse_lease_date(&hint, &c[2]);
            (Some(hint), date)
        }
        None => (None, None),
    };

    let tenant = TENANT_RE
        .captures(&window)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty());

    let best_amount = amounts.iter().copied().reduce(f64::max);

    RentRollCandidate {
        page,
        window,
        tenant,
        sqft,
        amounts,
        lease_hint,
        lease_date,
        best_amount,
    }
}

fn parse_lease_date(hint: &str, year: &str) -> Option<NaiveDate> {
    let month = match hint.get(..3)?.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1)
}

/// Keeps the lines that mention a known T12 line item, with their amounts.
pub fn scan_t12_lines<S: AsRef<str>>(pages: &[S]) -> Vec<T12CandidateLine> {
    let text_all = pages
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = collapse_horizontal_whitespace(&text_all);
    let filter = t12_line_filter();

    non_empty_lines(&collapsed)
        .into_iter()
        .filter(|line| filter.is_match(line))
        .map(|line| T12CandidateLine {
            line: line.to_string(),
            amounts: extract_amounts(line),
        })
        .collect()
}

/// Runs of two or more spaces/tabs become one space. Newlines are kept so
/// line items stay on their own lines.
fn collapse_horizontal_whitespace(text: &str) -> String {
    static RUNS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\S\n]{2,}").expect("Failed to compile whitespace regex"));
    RUNS.replace_all(text, " ").into_owned()
}

/// Last amount on the first candidate line that matches `patterns` and
/// carries at least one amount.
fn pick_for_patterns(lines: &[T12CandidateLine], patterns: &PatternSet) -> Option<f64> {
    lines
        .iter()
        .find(|c| !c.amounts.is_empty() && patterns.is_match(&c.line))
        .and_then(|c| c.amounts.last().copied())
}

pub fn summarize_t12_lines(lines: &[T12CandidateLine]) -> T12Summary {
    let pick = |item: LineItem| pick_for_patterns(lines, item.text_patterns());

    let summary = T12Summary {
        gross_potential_rent: pick(LineItem::GrossPotentialRent),
        vacancy: pick(LineItem::Vacancy),
        other_income: pick(LineItem::OtherIncome),
        effective_gross_income: pick(LineItem::EffectiveGrossIncome),
        operating_expenses: pick(LineItem::OperatingExpenses),
        net_operating_income: pick(LineItem::NetOperatingIncome),
    };
    fill_derived_t12(summary)
}

/// EGI from GPR − vacancy + other income when no EGI line was found, then NOI
/// from EGI − opex when no NOI line was found. Vacancy is a deduction whether
/// the source printed it as `(25,000)` or `25,000`.
pub(crate) fn fill_derived_t12(mut summary: T12Summary) -> T12Summary {
    if summary.effective_gross_income.is_none() {
        if let Some(gpr) = summary.gross_potential_rent {
            summary.effective_gross_income = Some(
                gpr - summary.vacancy.map(f64::abs).unwrap_or(0.0)
                    + summary.other_income.unwrap_or(0.0),
            );
        }
    }
    if summary.net_operating_income.is_none() {
        if let (Some(egi), Some(opex)) = (
            summary.effective_gross_income,
            summary.operating_expenses,
        ) {
            summary.net_operating_income = Some(egi - opex);
        }
    }
    summary
}

pub fn parse_t12_text<S: AsRef<str>>(pages: &[S]) -> T12Summary {
    summarize_t12_lines(&scan_t12_lines(pages))
}

const LABELED_NUMBER: &str = r"\s*(?:\([^)]*\))?\s*[:\-=]?\s*(\(?-?\$?\s*\d[\d,]*(?:\.\d+)?\)?)";

/// Label → pattern for aggregated rent-roll blocks. The value is the first capture.
pub const RENT_ROLL_SUMMARY_LABELS: &[(&str, &str)] = &[
    ("total_units", r"total\s+(?:units|suites)"),
    ("current_rent_total", r"(?:total\s+)?current\s+rent(?:\s+total)?"),
    ("market_rent_total", r"(?:total\s+)?market\s+rent(?:\s+total)?"),
];

/// Label → pattern for aggregated operating-statement blocks.
pub const T12_SUMMARY_LABELS: &[(&str, &str)] = &[
    ("gross_potential_rent", r"gross\s+potential\s+rent"),
    ("vacancy", r"vacancy(?:\s*(?:&|and)\s*credit\s+loss)?"),
    ("other_income", r"other\s+income"),
    ("effective_gross_income", r"effective\s+gross\s+income"),
    ("operating_expenses", r"(?:total\s+)?operating\s+expenses"),
    ("net_operating_income", r"net\s+operating\s+income"),
];

static RENT_ROLL_SUMMARY_RES: Lazy<Vec<(&'static str, Regex)>> =
    Lazy::new(|| compile_labels(RENT_ROLL_SUMMARY_LABELS));

static T12_SUMMARY_RES: Lazy<Vec<(&'static str, Regex)>> =
    Lazy::new(|| compile_labels(T12_SUMMARY_LABELS));

fn compile_labels(labels: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    labels
        .iter()
        .map(|(key, label)| {
            let pattern = format!(r"(?i)\b{}{}", label, LABELED_NUMBER);
            let re = Regex::new(&pattern).expect("Failed to compile summary label pattern");
            (*key, re)
        })
        .collect()
}

fn extract_labeled_values<S: AsRef<str>>(
    pages: &[S],
    labels: &[(&'static str, Regex)],
) -> BTreeMap<&'static str, f64> {
    let text = pages
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("\n");

    labels
        .iter()
        .filter_map(|(key, re)| {
            re.captures(&text)
                .and_then(|c| parse_number(&c[1]))
                .map(|value| (*key, value))
        })
        .collect()
}

/// Reads "Total Units: 120" style blocks. The rent gap is recomputed from
/// the totals rather than read.
pub fn parse_rent_roll_summary_text<S: AsRef<str>>(pages: &[S]) -> RentRollSummary {
    let values = extract_labeled_values(pages, &RENT_ROLL_SUMMARY_RES);
    let total_units = values
        .get("total_units")
        .filter(|u| **u > 0.0)
        .map(|u| u.round() as u64);
    RentRollSummary::from_totals(
        total_units,
        values.get("current_rent_total").copied().unwrap_or(0.0),
        values.get("market_rent_total").copied().unwrap_or(0.0),
    )
}

pub fn parse_t12_summary_text<S: AsRef<str>>(pages: &[S]) -> T12Summary {
    let values = extract_labeled_values(pages, &T12_SUMMARY_RES);
    let get = |key: &str| values.get(key).copied();
    fill_derived_t12(T12Summary {
        gross_potential_rent: get("gross_potential_rent"),
        vacancy: get("vacancy"),
        other_income: get("other_income"),
        effective_gross_income: get("effective_gross_income"),
        operating_expenses: get("operating_expenses"),
        net_operating_income: get("net_operating_income"),
    })
}

/// Diagnostic side channel for the text heuristics. Never affects results.
pub trait DebugSink: Send + Sync {
    fn rent_roll_candidates(&self, _source_id: &str, _candidates: &[RentRollCandidate]) {}

    fn t12_lines(&self, _source_id: &str, _lines: &[T12CandidateLine]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {}

/// Writes candidates as pretty JSON files under a directory.
#[derive(Debug, Clone)]
pub struct JsonDebugSink {
    dir: PathBuf,
}

impl JsonDebugSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source_id: &str, kind: &str) -> PathBuf {
        let stem: String = Path::new(source_id)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_id.to_string())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{}_{}.json", stem, kind))
    }

    fn write<T: Serialize>(&self, source_id: &str, kind: &str, payload: &T) {
        let path = self.path_for(source_id, kind);
        let result = fs::create_dir_all(&self.dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_string_pretty(payload).map_err(|e| e.to_string()))
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
        match result {
            Ok(()) => debug!("Wrote debug artifact {}", path.display()),
            Err(e) => warn!("Could not write debug artifact {}: {}", path.display(), e),
        }
    }
}

impl DebugSink for JsonDebugSink {
    fn rent_roll_candidates(&self, source_id: &str, candidates: &[RentRollCandidate]) {
        self.write(source_id, "rent_roll_candidates", &candidates);
    }

    fn t12_lines(&self, source_id: &str, lines: &[T12CandidateLine]) {
        self.write(source_id, "t12_candidates", &lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENT_ROLL_PAGE: &str = "\
Tenant Schedule
Suite 100 Acme Dental LLC
2,400 SF  Lease exp Mar 2027
Monthly $4,800.00
Suite 200 Blue Fern Yoga
1,150 SF  Lease exp Sep-2025
Monthly $2,300.00
";

    #[test]
    fn test_rent_roll_candidates_from_suite_lines() {
        let candidates = parse_rent_roll_text(&[RENT_ROLL_PAGE]);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.page, 1);
        assert_eq!(first.sqft, Some(2400.0));
        assert_eq!(first.lease_hint.as_deref(), Some("Mar 2027"));
        assert_eq!(first.lease_date, NaiveDate::from_ymd_opt(2027, 3, 1));
        assert_eq!(first.best_amount, Some(4800.0));
        assert!(first.tenant.as_deref().unwrap().starts_with("Tenant Schedule"));

        // Windows overlap, so the second row still sees the first row's lines.
        let second = &candidates[1];
        assert!(second.window.contains("Blue Fern Yoga"));
        assert!(second.amounts.contains(&2300.0));
    }

    #[test]
    fn test_window_spans_neighbouring_lines() {
        let candidates = parse_rent_roll_text(&["a\nb\nc\n#12 Kiosk\nd\ne\nf\ng"]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].window, "b | c | #12 Kiosk | d | e | f");
    }

    #[test]
    fn test_leading_unit_number_is_anchor() {
        assert!(is_row_anchor("101 Corner Bakery"));
        assert!(is_row_anchor("Ste 4"));
        assert!(!is_row_anchor("Total 1"));
        assert!(!is_row_anchor("Consistent income"));
    }

    #[test]
    fn test_t12_text_picks_last_amount_of_first_line() {
        let page = "\
Operating Statement      2023        2024
Gross Potential Rent     480,000     500,000
Vacancy & Credit Loss    (24,000)    (25,000)
Other Income             10,000      12,000
Total Operating Expenses 140,000     150,000
";
        let summary = parse_t12_text(&[page]);
        assert_eq!(summary.gross_potential_rent, Some(500_000.0));
        assert_eq!(summary.vacancy, Some(25_000.0));
        assert_eq!(summary.other_income, Some(12_000.0));
        assert_eq!(summary.effective_gross_income, Some(487_000.0));
        assert_eq!(summary.operating_expenses, Some(150_000.0));
        assert_eq!(summary.net_operating_income, Some(337_000.0));
    }

    #[test]
    fn test_explicit_noi_is_kept() {
        let page = "Effective Gross Income 400,000\nOperating Expenses 100,000\nNet Operating Income 310,000";
        let summary = parse_t12_text(&[page]);
        assert_eq!(summary.effective_gross_income, Some(400_000.0));
        assert_eq!(summary.net_operating_income, Some(310_000.0));
    }

    #[test]
    fn test_t12_text_without_items_is_empty() {
        assert!(parse_t12_text(&["Property photos", "Amenities: pool"]).is_empty());
        assert!(parse_t12_text::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_labeled_rent_roll_summary() {
        let text = "Rent Roll Summary\nTotal Units: 120\nCurrent Rent Total: $1,200,000\nMarket Rent Total: $1,500,000";
        let summary = parse_rent_roll_summary_text(&[text]);
        assert_eq!(summary.total_units, Some(120));
        assert_eq!(summary.current_rent_total, Some(1_200_000.0));
        assert_eq!(summary.market_rent_total, Some(1_500_000.0));
        assert!((summary.rent_gap_pct.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_labeled_t12_summary() {
        let text = "Net Operating Income: $325,000\nGross Potential Rent - 500,000";
        let summary = parse_t12_summary_text(&[text]);
        assert_eq!(summary.net_operating_income, Some(325_000.0));
        assert_eq!(summary.gross_potential_rent, Some(500_000.0));
        assert_eq!(summary.effective_gross_income, Some(500_000.0));
    }

    #[test]
    fn test_json_debug_sink_path_is_flat() {
        let sink = JsonDebugSink::new("/tmp/debug");
        let path = sink.path_for("/data/deal one/rent roll.pdf", "t12_candidates");
        assert_eq!(path, PathBuf::from("/tmp/debug/rent_roll_pdf_t12_candidates.json"));
    }
}
