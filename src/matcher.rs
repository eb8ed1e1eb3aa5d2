//! Regex-vocabulary field resolution.
//!
//! Every vocabulary is plain data (an ordered list of pattern strings tagged
//! with the field it resolves), compiled once into a [`PatternSet`]. Column
//! names and row labels are matched case-insensitively with an unanchored
//! search, so `rent` finds "Base Rent (Annual)".

use crate::error::{Result, UnderwritingError};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic columns resolved per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnField {
    Rent,
    MarketRent,
    Psf,
    Area,
    /// The label column of an operating statement.
    LineItemLabel,
    /// Period headers that denote the most recent or total figure.
    RecentPeriod,
    /// PSF headers quoted per month rather than per year.
    MonthlyRate,
}

/// Most specific pattern first.
pub const COLUMN_PATTERNS: &[(ColumnField, &[&str])] = &[
    (
        ColumnField::Rent,
        &[
            r"(^|[^a-z])rent([^a-z]|$)",
            r"current.*rent",
            r"base.*rent",
            r"annual.*rent",
            r"monthly.*rent",
        ],
    ),
    (ColumnField::MarketRent, &[r"market.*rent", r"asking.*rent"]),
    (ColumnField::Psf, &[r"psf", r"per\s*sf"]),
    (ColumnField::Area, &[r"\bsf\b", r"sq.?ft", r"area", r"sf"]),
    (
        ColumnField::LineItemLabel,
        &[r"^account", r"^category", r"^description", r"^item"],
    ),
    (
        ColumnField::RecentPeriod,
        &[r"ttm", r"ytd", r"(19|20)\d{2}", r"total", r"current", r"actual"],
    ),
    (
        ColumnField::MonthlyRate,
        &[r"/\s*mo", r"per\s*month", r"monthly"],
    ),
];

/// T12 line-item families shared by the table and text extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItem {
    GrossPotentialRent,
    Vacancy,
    OtherIncome,
    EffectiveGrossIncome,
    OperatingExpenses,
    NetOperatingIncome,
}

impl LineItem {
    pub const ALL: [LineItem; 6] = [
        LineItem::GrossPotentialRent,
        LineItem::Vacancy,
        LineItem::OtherIncome,
        LineItem::EffectiveGrossIncome,
        LineItem::OperatingExpenses,
        LineItem::NetOperatingIncome,
    ];
}

/// Row-label families used when summing a structured operating statement.
///
/// Expenses are matched by category since statements rarely repeat a
/// single "operating expenses" row.
pub const TABLE_LINE_ITEM_PATTERNS: &[(LineItem, &[&str])] = &[
    (
        LineItem::GrossPotentialRent,
        &[r"gross.*potential.*rent", r"potential.*rent", r"gpr"],
    ),
    (
        LineItem::Vacancy,
        &[r"vacancy", r"credit.*loss", r"loss.*to.*lease"],
    ),
    (
        LineItem::OtherIncome,
        &[
            r"other.*income",
            r"misc.*income",
            r"parking",
            r"storage",
            r"laundry",
        ],
    ),
    (
        LineItem::OperatingExpenses,
        &[
            r"expenses",
            r"repairs",
            r"maintenance",
            r"payroll",
            r"tax",
            r"insurance",
            r"utilities",
        ],
    ),
];

/// Line-item families used when scanning free text.
pub const TEXT_LINE_ITEM_PATTERNS: &[(LineItem, &[&str])] = &[
    (
        LineItem::GrossPotentialRent,
        &[r"gross.*potential.*rent", r"potential.*rent", r"gpr"],
    ),
    (
        LineItem::Vacancy,
        &[r"vacancy", r"credit.*loss", r"loss.*to.*lease"],
    ),
    (
        LineItem::OtherIncome,
        &[
            r"other.*income",
            r"misc.*income",
            r"parking",
            r"laundry",
            r"storage",
        ],
    ),
    (
        LineItem::EffectiveGrossIncome,
        &[r"effective gross income", r"effective.*gross", r"egi"],
    ),
    (
        LineItem::OperatingExpenses,
        &[
            r"operating expenses",
            r"total expenses",
            r"expenses",
            r"total operating expenses",
        ],
    ),
    (
        LineItem::NetOperatingIncome,
        &[r"net operating income", r"noi"],
    ),
];

/// Phrases that make a text line worth keeping as a T12 candidate.
pub const T12_LINE_FILTER: &[&str] = &[
    r"gross.*potential.*rent",
    r"potential.*rent",
    r"gpr",
    r"effective gross",
    r"net operating income",
    r"operating expenses",
    r"total expenses",
    r"vacancy",
    r"credit loss",
    r"other income",
    r"misc income",
    r"parking",
    r"storage",
    r"laundry",
];

/// An ordered list of compiled, case-insensitive patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    sources: Vec<String>,
    regexes: Vec<Regex>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut sources = Vec::with_capacity(patterns.len());
        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| UnderwritingError::InvalidPattern {
                    pattern: pattern.to_string(),
                    details: e.to_string(),
                })?;
            sources.push(pattern.to_string());
            regexes.push(regex);
        }
        Ok(Self { sources, regexes })
    }

    pub fn patterns(&self) -> &[String] {
        &self.sources
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regexes.iter().any(|re| re.is_match(text))
    }

    /// First column matching any pattern. Patterns are the outer loop, so an
    /// earlier pattern wins regardless of where its column sits.
    pub fn first_match<'a, S: AsRef<str>>(&self, columns: &'a [S]) -> Option<&'a str> {
        self.regexes.iter().find_map(|re| {
            columns
                .iter()
                .map(|c| AsRef::<str>::as_ref(c))
                .find(|column| re.is_match(column.trim()))
        })
    }
}

fn compile_static<K: Copy + Eq + std::hash::Hash>(
    table: &[(K, &[&str])],
) -> HashMap<K, PatternSet> {
    table
        .iter()
        .map(|(key, patterns)| {
            let patterns: &[&str] = patterns;
            let set = PatternSet::new(patterns).expect("Failed to compile built-in pattern table");
            (*key, set)
        })
        .collect()
}

static COLUMN_SETS: Lazy<HashMap<ColumnField, PatternSet>> =
    Lazy::new(|| compile_static(COLUMN_PATTERNS));

static TABLE_LINE_ITEM_SETS: Lazy<HashMap<LineItem, PatternSet>> =
    Lazy::new(|| compile_static(TABLE_LINE_ITEM_PATTERNS));

static TEXT_LINE_ITEM_SETS: Lazy<HashMap<LineItem, PatternSet>> =
    Lazy::new(|| compile_static(TEXT_LINE_ITEM_PATTERNS));

static T12_LINE_FILTER_SET: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(T12_LINE_FILTER).expect("Failed to compile T12_LINE_FILTER")
});

impl ColumnField {
    pub fn pattern_set(&self) -> &'static PatternSet {
        &COLUMN_SETS[self]
    }
}

impl LineItem {
    /// `None` when the structured-table vocabulary does not sum this item
    /// (EGI and NOI are derived there, not summed).
    pub fn table_patterns(&self) -> Option<&'static PatternSet> {
        TABLE_LINE_ITEM_SETS.get(self)
    }

    pub fn text_patterns(&self) -> &'static PatternSet {
        &TEXT_LINE_ITEM_SETS[self]
    }
}

pub fn t12_line_filter() -> &'static PatternSet {
    &T12_LINE_FILTER_SET
}

/// Resolves which of `columns` holds `field`.
pub fn first_match<S: AsRef<str>>(columns: &[S], field: ColumnField) -> Option<&str> {
    field.pattern_set().first_match(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pattern_priority_beats_column_order() {
        let set = PatternSet::new(&["market.*rent", "rent"]).unwrap();
        let columns = cols(&["Rent", "Tenant", "Market Rent"]);
        assert_eq!(set.first_match(&columns), Some("Market Rent"));

        let reversed = cols(&["Market Rent", "Tenant", "Rent"]);
        assert_eq!(set.first_match(&reversed), Some("Market Rent"));
    }

    #[test]
    fn test_case_insensitive_substring_search() {
        let columns = cols(&["Suite", "ANNUAL BASE RENT ($)"]);
        assert_eq!(
            first_match(&columns, ColumnField::Rent),
            Some("ANNUAL BASE RENT ($)")
        );
    }

    #[test]
    fn test_no_match_is_none() {
        let columns = cols(&["Tenant", "Suite"]);
        assert_eq!(first_match(&columns, ColumnField::MarketRent), None);
    }

    #[test]
    fn test_area_prefers_standalone_sf_over_psf() {
        let columns = cols(&["Tenant", "Rent PSF", "SF"]);
        assert_eq!(first_match(&columns, ColumnField::Area), Some("SF"));
        assert_eq!(first_match(&columns, ColumnField::Psf), Some("Rent PSF"));
    }

    #[test]
    fn test_word_bounded_rent_skips_parent() {
        let columns = cols(&["Parent Company", "Current Rent"]);
        assert_eq!(first_match(&columns, ColumnField::Rent), Some("Current Rent"));
    }

    #[test]
    fn test_invalid_pattern_reports_error() {
        let err = PatternSet::new(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, UnderwritingError::InvalidPattern { .. }));
    }

    #[test]
    fn test_builtin_tables_compile() {
        for (field, _) in COLUMN_PATTERNS {
            assert!(!field.pattern_set().patterns().is_empty());
        }
        for item in LineItem::ALL {
            assert!(!item.text_patterns().patterns().is_empty());
        }
        assert!(LineItem::EffectiveGrossIncome.table_patterns().is_none());
        assert!(t12_line_filter().is_match("Net Operating Income  1,000"));
    }
}
