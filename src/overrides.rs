use crate::utils::{finite_or_none, parse_number};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys callers may override. Any other key is carried but ignored.
pub mod keys {
    pub const NET_OPERATING_INCOME: &str = "net_operating_income";
    pub const GROSS_POTENTIAL_RENT: &str = "gross_potential_rent";
    pub const EFFECTIVE_GROSS_INCOME: &str = "effective_gross_income";
    pub const OPERATING_EXPENSES: &str = "operating_expenses";
    pub const CURRENT_RENT_TOTAL: &str = "current_rent_total";
    pub const MARKET_RENT_TOTAL: &str = "market_rent_total";
    pub const RENT_GAP_PCT: &str = "rent_gap_pct";
    pub const TOTAL_BUILDING_SQFT: &str = "total_building_sqft";
    pub const TOTAL_UNITS: &str = "total_units";
    pub const PURCHASE_PRICE: &str = "purchase_price";
    pub const ANNUAL_DEBT_SERVICE: &str = "annual_debt_service";
    pub const EQUITY_INVESTED: &str = "equity_invested";

    pub const ALL: &[&str] = &[
        NET_OPERATING_INCOME,
        GROSS_POTENTIAL_RENT,
        EFFECTIVE_GROSS_INCOME,
        OPERATING_EXPENSES,
        CURRENT_RENT_TOTAL,
        MARKET_RENT_TOTAL,
        RENT_GAP_PCT,
        TOTAL_BUILDING_SQFT,
        TOTAL_UNITS,
        PURCHASE_PRICE,
        ANNUAL_DEBT_SERVICE,
        EQUITY_INVESTED,
    ];
}

/// Caller-supplied values that win over anything extracted.
///
/// Values may be JSON numbers or strings such as `"$5,000,000"`; a value
/// only counts when it normalizes to a finite number. The map is never
/// mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(transparent)]
pub struct Overrides {
    values: BTreeMap<String, Value>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Parses a JSON object, falling back to no overrides on malformed input.
    pub fn parse_lenient(raw: &str) -> Self {
        match serde_json::from_str::<Overrides>(raw) {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!("Ignoring malformed overrides ({}): {}", e, raw);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The override for `key` when present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64().and_then(finite_or_none),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    /// `override > fallback`.
    pub fn resolve(&self, key: &str, fallback: Option<f64>) -> Option<f64> {
        self.number(key).or(fallback)
    }

    /// Keys outside [`keys::ALL`]; nothing reads them.
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .map(String::as_str)
            .filter(|k| !keys::ALL.contains(k))
            .collect()
    }

    /// Keys whose values are present but not numeric.
    pub fn unusable_keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter(|k| self.number(k).is_none())
            .map(String::as_str)
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_values() {
        let overrides = Overrides::new()
            .with(keys::PURCHASE_PRICE, "$5,000,000")
            .with(keys::ANNUAL_DEBT_SERVICE, 250_000.0)
            .with(keys::EQUITY_INVESTED, "N/A")
            .with(keys::TOTAL_UNITS, true);

        assert_eq!(overrides.number(keys::PURCHASE_PRICE), Some(5_000_000.0));
        assert_eq!(overrides.number(keys::ANNUAL_DEBT_SERVICE), Some(250_000.0));
        assert_eq!(overrides.number(keys::EQUITY_INVESTED), None);
        assert_eq!(overrides.number(keys::TOTAL_UNITS), None);
        assert_eq!(
            overrides.unusable_keys(),
            vec![keys::EQUITY_INVESTED, keys::TOTAL_UNITS]
        );
    }

    #[test]
    fn test_resolve_prefers_override_even_when_zero() {
        let overrides = Overrides::new().with(keys::NET_OPERATING_INCOME, 0);
        assert_eq!(
            overrides.resolve(keys::NET_OPERATING_INCOME, Some(325_000.0)),
            Some(0.0)
        );
        assert_eq!(overrides.resolve(keys::OPERATING_EXPENSES, Some(1.0)), Some(1.0));
    }

    #[test]
    fn test_parse_lenient() {
        let parsed = Overrides::parse_lenient(r#"{"purchase_price": 4200000}"#);
        assert_eq!(parsed.number(keys::PURCHASE_PRICE), Some(4_200_000.0));

        assert!(Overrides::parse_lenient("not json").is_empty());
        assert!(Overrides::parse_lenient("[1, 2]").is_empty());
    }

    #[test]
    fn test_unknown_keys() {
        let overrides = Overrides::new()
            .with(keys::GROSS_POTENTIAL_RENT, 600_000)
            .with("cap_rate_target", 0.07)
            .with("noi", 1);
        assert_eq!(overrides.unknown_keys(), vec!["cap_rate_target", "noi"]);
        assert!(keys::ALL.iter().all(|k| Overrides::new().with(*k, 1).unknown_keys().is_empty()));
    }

    #[test]
    fn test_from_iterator() {
        let overrides: Overrides = [(keys::TOTAL_UNITS, 12)].into_iter().collect();
        assert_eq!(overrides.number(keys::TOTAL_UNITS), Some(12.0));
    }
}
