//! Property facts supplied by the narrative-extraction collaborator.
//!
//! Retrieval and model inference happen outside this crate. What lives here
//! is the contract: the fields we ask for, the configuration handed to the
//! collaborator, and tolerant parsing of whatever it answers.

use crate::error::{Result, UnderwritingError};
use crate::schema::Document;
use crate::utils::parse_number;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answers that mean "the model did not find it".
const SENTINELS: &[&str] = &[
    "",
    "i don't know",
    "i do not know",
    "not found",
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not available",
    "not specified",
];

pub const NARRATIVE_FIELD_NAMES: &[&str] = &[
    "property_name",
    "property_address",
    "property_type",
    "year_built",
    "renovation_year",
    "number_of_stories",
    "total_units_or_suites",
    "total_building_sqft",
    "amenities",
];

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^```(?:json)?\s*|\s*```$").expect("Failed to compile FENCE_RE"));

static FIRST_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("Failed to compile FIRST_NUMBER_RE"));

/// Explicit settings for the retrieval + model collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NarrativeConfig {
    pub embed_model: String,
    pub llm_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[schemars(description = "Number of retrieved chunks handed to the model.")]
    pub retrieval_k: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            embed_model: "text-embedding-3-small".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            chunk_size: 1000,
            chunk_overlap: 150,
            retrieval_k: 6,
        }
    }
}

impl NarrativeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(UnderwritingError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than a non-zero chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(UnderwritingError::InvalidConfig(
                "retrieval_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct NarrativeFields {
    pub property_name: Option<String>,
    pub property_address: Option<String>,
    pub property_type: Option<String>,
    pub year_built: Option<String>,
    pub renovation_year: Option<String>,
    pub number_of_stories: Option<String>,
    pub total_units_or_suites: Option<f64>,
    pub total_building_sqft: Option<f64>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

impl NarrativeFields {
    /// Builds fields from a loosely-typed JSON object. Sentinel answers become
    /// `None`; numeric fields accept free text like "approx. 45,000 SF".
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(text_value);
        let number = |key: &str| value.get(key).and_then(numeric_value);

        let amenities = match value.get("amenities") {
            Some(Value::Array(items)) => items.iter().filter_map(text_value).collect(),
            Some(other) => text_value(other)
                .map(|s| {
                    s.split([',', ';'])
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        Self {
            property_name: text("property_name"),
            property_address: text("property_address"),
            property_type: text("property_type"),
            year_built: text("year_built"),
            renovation_year: text("renovation_year"),
            number_of_stories: text("number_of_stories"),
            total_units_or_suites: number("total_units_or_suites"),
            total_building_sqft: number("total_building_sqft"),
            amenities,
        }
    }
}

fn is_sentinel(text: &str) -> bool {
    let lower = text.trim().trim_end_matches('.').to_lowercase();
    SENTINELS.contains(&lower.as_str())
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_sentinel(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) if !is_sentinel(s) => extract_sqft_value(s),
        _ => None,
    }
}

/// First number in free text: "approx. 45,000 SF" → 45000.
pub fn extract_sqft_value(text: &str) -> Option<f64> {
    FIRST_NUMBER_RE
        .find(text)
        .and_then(|m| parse_number(m.as_str()))
}

/// Strips Markdown code fences and parses the model's JSON answer.
pub fn parse_narrative_response(raw: &str) -> Result<NarrativeFields> {
    let cleaned = FENCE_RE.replace_all(raw.trim(), "");
    let value: Value = serde_json::from_str(cleaned.trim())?;
    if !value.is_object() {
        return Err(UnderwritingError::NarrativeExtraction(format!(
            "expected a JSON object, got {}",
            value
        )));
    }
    Ok(NarrativeFields::from_value(&value))
}

/// Prompt text asking the model for [`NARRATIVE_FIELD_NAMES`] from `context`.
pub fn build_narrative_prompt(context: &str) -> String {
    let fields = NARRATIVE_FIELD_NAMES
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Extract ONLY from the provided context. If a field is not found, write 'Not found'. \
         Respond in strict JSON.\n\nExtract these fields:\n{}\n\nContext:\n{}",
        fields, context
    )
}

/// The external collaborator that turns documents into property facts.
pub trait NarrativeExtractor: Send + Sync {
    fn extract(&self, documents: &[Document], config: &NarrativeConfig) -> Result<NarrativeFields>;
}

/// Facts known up front (e.g. from a previous run or a form).
impl NarrativeExtractor for NarrativeFields {
    fn extract(&self, _documents: &[Document], _config: &NarrativeConfig) -> Result<NarrativeFields> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_response() {
        let raw = "```json\n{\"property_name\": \"Oak Plaza\", \"total_building_sqft\": \"45,000 SF\", \"year_built\": 1987}\n```";
        let fields = parse_narrative_response(raw).unwrap();
        assert_eq!(fields.property_name.as_deref(), Some("Oak Plaza"));
        assert_eq!(fields.total_building_sqft, Some(45_000.0));
        assert_eq!(fields.year_built.as_deref(), Some("1987"));
    }

    #[test]
    fn test_sentinels_become_none() {
        let fields = NarrativeFields::from_value(&json!({
            "property_name": "I don't know",
            "property_address": "Not found.",
            "total_units_or_suites": "unknown",
            "amenities": "Pool, Gym; Parking"
        }));
        assert_eq!(fields.property_name, None);
        assert_eq!(fields.property_address, None);
        assert_eq!(fields.total_units_or_suites, None);
        assert_eq!(fields.amenities, vec!["Pool", "Gym", "Parking"]);
    }

    #[test]
    fn test_non_object_response_is_error() {
        assert!(parse_narrative_response("[1,2,3]").is_err());
        assert!(parse_narrative_response("no json here").is_err());
    }

    #[test]
    fn test_extract_sqft_value() {
        assert_eq!(extract_sqft_value("approx. 45,000 SF"), Some(45_000.0));
        assert_eq!(extract_sqft_value("unknown"), None);
    }

    #[test]
    fn test_prompt_lists_every_field() {
        let prompt = build_narrative_prompt("ctx");
        for field in NARRATIVE_FIELD_NAMES {
            assert!(prompt.contains(field));
        }
        assert!(prompt.ends_with("ctx"));
    }

    #[test]
    fn test_config_validation() {
        assert!(NarrativeConfig::default().validate().is_ok());
        let bad = NarrativeConfig {
            chunk_overlap: 2000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
