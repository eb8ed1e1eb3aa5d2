use crate::utils::finite_or_none;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar cell as handed over by a spreadsheet or PDF table loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// A named-column table. Rows are stored positionally, aligned with `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row<V: Into<CellValue>>(&mut self, values: impl IntoIterator<Item = V>) {
        let mut row: Vec<CellValue> = values
            .into_iter()
            .take(self.columns.len())
            .map(Into::into)
            .collect();
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn with_row<V: Into<CellValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_row(values);
        self
    }

    /// Builds a table from a raw grid whose first row is the header.
    ///
    /// Returns `None` when the grid has fewer than two rows, since a header
    /// without a body carries no figures.
    pub fn from_grid<S: AsRef<str>>(grid: &[Vec<S>]) -> Option<Self> {
        if grid.len() < 2 {
            return None;
        }
        let mut table = Table::new(grid[0].iter().map(|h| h.as_ref().trim().to_string()));
        for row in &grid[1..] {
            table.push_row(row.iter().map(|c| {
                let text = c.as_ref().trim();
                if text.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(text.to_string())
                }
            }));
        }
        Some(table)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Iterates a column top to bottom. Unknown columns yield nothing.
    pub fn column_values<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a CellValue> + 'a {
        let idx = self.column_index(column);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct DocumentMetadata {
    /// Identifier of the originating file (usually a path).
    pub source: Option<String>,
    pub page: Option<u32>,
    pub sheet: Option<String>,
    /// Name of the loader that produced this document. Never used for classification.
    pub loader: Option<String>,
}

/// Already-loaded document content: page text and/or an attached table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Document {
    pub page_content: String,
    pub table: Option<Table>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn from_text(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            page_content: text.into(),
            table: None,
            metadata: DocumentMetadata {
                source: Some(source.into()),
                page: Some(page),
                ..Default::default()
            },
        }
    }

    pub fn from_table(source: impl Into<String>, table: Table) -> Self {
        Self {
            page_content: String::new(),
            table: Some(table),
            metadata: DocumentMetadata {
                source: Some(source.into()),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableClass {
    RentRoll,
    T12,
    Other,
}

impl TableClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableClass::RentRoll => "rent_roll",
            TableClass::T12 => "t12",
            TableClass::Other => "other",
        }
    }
}

impl fmt::Display for TableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClassifiedBuckets {
    pub rent_roll: Vec<Table>,
    pub t12: Vec<Table>,
    pub other: Vec<Table>,
}

impl ClassifiedBuckets {
    pub fn push(&mut self, class: TableClass, table: Table) {
        self.bucket_mut(class).push(table);
    }

    pub fn get(&self, class: TableClass) -> &[Table] {
        match class {
            TableClass::RentRoll => &self.rent_roll,
            TableClass::T12 => &self.t12,
            TableClass::Other => &self.other,
        }
    }

    fn bucket_mut(&mut self, class: TableClass) -> &mut Vec<Table> {
        match class {
            TableClass::RentRoll => &mut self.rent_roll,
            TableClass::T12 => &mut self.t12,
            TableClass::Other => &mut self.other,
        }
    }

    pub fn len(&self) -> usize {
        self.rent_roll.len() + self.t12.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct RentRollSummary {
    pub total_units: Option<u64>,
    pub current_rent_total: Option<f64>,
    pub market_rent_total: Option<f64>,
    pub rent_gap_pct: Option<f64>,
}

impl RentRollSummary {
    /// Builds a summary from raw totals. Zero or non-finite totals are treated as
    /// "not found", and the gap is only reported against a positive market total.
    pub fn from_totals(
        total_units: Option<u64>,
        current_rent_total: f64,
        market_rent_total: f64,
    ) -> Self {
        let current = positive(current_rent_total);
        let market = positive(market_rent_total);
        Self {
            total_units,
            current_rent_total: current,
            market_rent_total: market,
            rent_gap_pct: market.and_then(|m| rent_gap_pct(current_rent_total, m)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_units.is_none()
            && self.current_rent_total.is_none()
            && self.market_rent_total.is_none()
            && self.rent_gap_pct.is_none()
    }
}

/// `(market - current) / market * 100`, `None` unless market is positive.
pub fn rent_gap_pct(current: f64, market: f64) -> Option<f64> {
    if market > 0.0 {
        finite_or_none((market - current) / market * 100.0)
    } else {
        None
    }
}

fn positive(value: f64) -> Option<f64> {
    finite_or_none(value).filter(|v| *v > 0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct T12Summary {
    pub gross_potential_rent: Option<f64>,
    pub vacancy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_income: Option<f64>,
    pub effective_gross_income: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub net_operating_income: Option<f64>,
}

impl T12Summary {
    pub fn is_empty(&self) -> bool {
        self.gross_potential_rent.is_none()
            && self.vacancy.is_none()
            && self.other_income.is_none()
            && self.effective_gross_income.is_none()
            && self.operating_expenses.is_none()
            && self.net_operating_income.is_none()
    }
}

/// Final underwriting metrics. Ratios are fractions except `rent_gap_pct` and
/// `irr_5yr`, which are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct MetricsResult {
    pub cap_rate: Option<f64>,
    pub dscr: Option<f64>,
    pub coc_return: Option<f64>,
    pub irr_5yr: Option<f64>,
    pub rent_gap_pct: Option<f64>,
    pub price_per_sqft: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub break_even_occupancy: Option<f64>,
    pub current_rent_total: Option<f64>,
    pub market_rent_total: Option<f64>,
    pub purchase_price: Option<f64>,
}

impl MetricsResult {
    /// Replaces any NaN or infinite field with `None`.
    pub fn sanitized(self) -> Self {
        Self {
            cap_rate: self.cap_rate.and_then(finite_or_none),
            dscr: self.dscr.and_then(finite_or_none),
            coc_return: self.coc_return.and_then(finite_or_none),
            irr_5yr: self.irr_5yr.and_then(finite_or_none),
            rent_gap_pct: self.rent_gap_pct.and_then(finite_or_none),
            price_per_sqft: self.price_per_sqft.and_then(finite_or_none),
            price_per_unit: self.price_per_unit.and_then(finite_or_none),
            break_even_occupancy: self.break_even_occupancy.and_then(finite_or_none),
            current_rent_total: self.current_rent_total.and_then(finite_or_none),
            market_rent_total: self.market_rent_total.and_then(finite_or_none),
            purchase_price: self.purchase_price.and_then(finite_or_none),
        }
    }

    pub fn json_schema() -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(schemars::schema_for!(MetricsResult))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_pads_short_rows() {
        let mut table = Table::new(["Tenant", "Rent", "SF"]);
        table.push_row(["Acme"]);
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.cell(0, "Rent"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_from_grid_requires_body() {
        let header_only = vec![vec!["Tenant", "Rent"]];
        assert!(Table::from_grid(&header_only).is_none());

        let grid = vec![vec![" Tenant ", "Rent"], vec!["Acme", ""]];
        let table = Table::from_grid(&grid).unwrap();
        assert_eq!(table.columns, vec!["Tenant", "Rent"]);
        assert_eq!(table.cell(0, "Rent"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_rent_roll_summary_zero_totals_are_missing() {
        let summary = RentRollSummary::from_totals(Some(4), 0.0, 0.0);
        assert_eq!(summary.current_rent_total, None);
        assert_eq!(summary.market_rent_total, None);
        assert_eq!(summary.rent_gap_pct, None);
        assert_eq!(summary.total_units, Some(4));
    }

    #[test]
    fn test_rent_gap_requires_positive_market() {
        assert_eq!(rent_gap_pct(100.0, 0.0), None);
        let gap = rent_gap_pct(10_000.0, 12_000.0).unwrap();
        assert!((gap - 16.6667).abs() < 0.001);
    }

    #[test]
    fn test_cell_value_deserializes_untagged() {
        let cells: Vec<CellValue> = serde_json::from_str(r#"[null, 12.5, "$1,000"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Empty,
                CellValue::Number(12.5),
                CellValue::Text("$1,000".to_string())
            ]
        );
    }

    #[test]
    fn test_metrics_serialize_nulls() {
        let json = serde_json::to_value(MetricsResult::default()).unwrap();
        assert!(json["cap_rate"].is_null());
        assert!(json.get("purchase_price").is_some());
    }
}
