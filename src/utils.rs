use crate::schema::CellValue;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tokens that loaders emit for "no value".
const PLACEHOLDER_TOKENS: &[&str] = &["", "-", "—", "–", "n/a", "na", "none"];

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\$?\d{1,3}[,\d]*(?:\.\d{1,2})?").expect("Failed to compile AMOUNT_RE")
});

/// Normalizes an arbitrary cell into a finite float.
///
/// Numbers pass through (non-finite ones become `None`); text goes through
/// [`parse_number`]. Never panics.
pub fn to_number(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) => finite_or_none(*n),
        CellValue::Text(s) => parse_number(s),
    }
}

/// Parses currency, percentage and accounting-style text.
///
/// - placeholder tokens (`""`, `-`, em/en dash, `N/A`, `NA`, `None`) give `None`
/// - `$`, `,` and `%` are stripped
/// - `(500)` is read as `-500`
pub fn parse_number(raw: &str) -> Option<f64> {
    if is_placeholder(raw.trim()) {
        return None;
    }

    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%'))
        .collect();
    let stripped = stripped.trim();
    if is_placeholder(stripped) {
        return None;
    }

    if let Ok(n) = stripped.parse::<f64>() {
        return finite_or_none(n);
    }

    let negated = stripped.replace('(', "-").replace(')', "");
    negated.trim().parse::<f64>().ok().and_then(finite_or_none)
}

fn is_placeholder(token: &str) -> bool {
    let lower = token.to_lowercase();
    PLACEHOLDER_TOKENS.contains(&lower.as_str())
}

pub fn finite_or_none(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Division that never produces an error, infinity or NaN.
pub fn safe_div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let n = numerator?;
    let d = denominator?;
    if d == 0.0 || !d.is_finite() || !n.is_finite() {
        return None;
    }
    finite_or_none(n / d)
}

/// Every monetary-looking number in `text`, in order of appearance.
pub fn extract_amounts(text: &str) -> Vec<f64> {
    AMOUNT_RE
        .find_iter(text)
        .filter_map(|m| parse_number(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_number("$1,234.56"), Some(1234.56));
        assert_eq!(parse_number("  $ 12,000 "), Some(12000.0));
    }

    #[test]
    fn test_parse_accounting_negative() {
        assert_eq!(parse_number("(500)"), Some(-500.0));
        assert_eq!(parse_number("($1,250.50)"), Some(-1250.5));
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_number("12.5%"), Some(12.5));
    }

    #[test]
    fn test_placeholders_are_none() {
        for token in ["", "-", "—", "–", "N/A", "NA", "None", "  ", "$-"] {
            assert_eq!(parse_number(token), None, "token {:?}", token);
        }
    }

    #[test]
    fn test_garbage_and_non_finite_are_none() {
        assert_eq!(parse_number("Suite 100"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(to_number(&CellValue::Number(f64::INFINITY)), None);
        assert_eq!(to_number(&CellValue::Number(42.0)), Some(42.0));
        assert_eq!(to_number(&CellValue::Empty), None);
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(Some(10.0), Some(0.0)), None);
        assert_eq!(safe_div(None, Some(2.0)), None);
        assert_eq!(safe_div(Some(2.0), None), None);
        assert_eq!(safe_div(Some(1.0), Some(f64::NAN)), None);
        assert_eq!(safe_div(Some(10.0), Some(4.0)), Some(2.5));
    }

    #[test]
    fn test_extract_amounts_in_order() {
        let amounts = extract_amounts("Suite 200 | 2,400 SF | $4,500.00 monthly | (-$12)");
        assert_eq!(amounts, vec![200.0, 2400.0, 4500.0, -12.0]);
    }
}
