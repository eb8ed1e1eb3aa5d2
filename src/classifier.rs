use crate::config::ClassificationConfig;
use crate::schema::{CellValue, ClassifiedBuckets, Table, TableClass};
use log::debug;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

pub const RENT_ROLL_KEYWORDS: &[&str] = &[
    "tenant", "suite", "unit", "lease", "psf", "rent", "term", "start", "end", "sf", "sqft",
    "occupied", "vacant",
];

pub const T12_KEYWORDS: &[&str] = &[
    "income", "revenue", "rent", "gpr", "noi", "expenses", "egi", "vacancy", "operating",
    "total",
];

/// A keyword set and the number of matching columns needed to claim a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub class: TableClass,
    pub keywords: Vec<String>,
    pub min_matches: usize,
}

impl Vocabulary {
    pub fn new(class: TableClass, keywords: &[&str], min_matches: usize) -> Self {
        Self {
            class,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            min_matches,
        }
    }

    /// Number of distinct columns whose name contains at least one keyword.
    pub fn score(&self, table: &Table) -> usize {
        table
            .columns
            .iter()
            .filter(|column| {
                let lower = column.to_lowercase();
                self.keywords.iter().any(|k| lower.contains(k.as_str()))
            })
            .count()
    }

    pub fn matches(&self, table: &Table) -> bool {
        self.score(table) >= self.min_matches
    }
}

/// Assigns every table to exactly one bucket.
///
/// Vocabularies are evaluated in order; the first one reaching its threshold
/// wins, anything else lands in [`TableClass::Other`].
#[derive(Debug, Clone)]
pub struct TableClassifier {
    vocabularies: Vec<Vocabulary>,
}

impl Default for TableClassifier {
    fn default() -> Self {
        Self::from_config(&ClassificationConfig::default())
    }
}

impl TableClassifier {
    pub fn new(vocabularies: Vec<Vocabulary>) -> Self {
        Self { vocabularies }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(vec![
            Vocabulary::new(
                TableClass::RentRoll,
                RENT_ROLL_KEYWORDS,
                config.rent_roll_min_matches,
            ),
            Vocabulary::new(TableClass::T12, T12_KEYWORDS, config.t12_min_matches),
        ])
    }

    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabularies
    }

    pub fn classify(&self, table: &Table) -> TableClass {
        let class = self
            .vocabularies
            .iter()
            .find(|v| v.matches(table))
            .map(|v| v.class)
            .unwrap_or(TableClass::Other);
        debug!("Classified table with columns {:?} as {}", table.columns, class);
        class
    }

    /// Cleans and classifies tables in parallel, preserving input order
    /// within each bucket.
    pub fn bucket_tables(&self, tables: Vec<Table>) -> ClassifiedBuckets {
        let classified: Vec<(TableClass, Table)> = tables
            .into_par_iter()
            .map(|table| {
                let cleaned = clean_table(&table);
                (self.classify(&cleaned), cleaned)
            })
            .collect();

        let mut buckets = ClassifiedBuckets::default();
        for (class, table) in classified {
            buckets.push(class, table);
        }
        buckets
    }
}

pub fn classify_table(table: &Table) -> TableClass {
    TableClassifier::default().classify(table)
}

pub fn classify_tables(tables: Vec<Table>) -> ClassifiedBuckets {
    TableClassifier::default().bucket_tables(tables)
}

/// Normalizes a loader table before classification:
/// drops all-empty and auto-generated `unnamed` columns, trims headers,
/// names blank headers by position and suffixes duplicates (`Rent`, `Rent_1`).
pub fn clean_table(table: &Table) -> Table {
    let keep: Vec<usize> = (0..table.columns.len())
        .filter(|&idx| {
            let name = table.columns[idx].trim().to_lowercase();
            if name.starts_with("unnamed") {
                return false;
            }
            table.rows.is_empty()
                || table
                    .rows
                    .iter()
                    .any(|row| !row.get(idx).map(CellValue::is_empty).unwrap_or(true))
        })
        .collect();

    let raw_names: Vec<String> = keep
        .iter()
        .map(|&idx| {
            let name = table.columns[idx].trim();
            if name.is_empty() {
                format!("column_{}", idx)
            } else {
                name.to_string()
            }
        })
        .collect();

    let rows = table
        .rows
        .iter()
        .map(|row| {
            keep.iter()
                .map(|&idx| row.get(idx).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Table {
        columns: dedupe_column_names(raw_names),
        rows,
    }
}

pub fn dedupe_column_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.clone()) {
            out.push(name);
            continue;
        }
        let counter = counters.entry(name.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", name, counter);
            if seen.insert(candidate.clone()) {
                out.push(candidate);
                break;
            }
        }
    }
    out
}
