use crate::error::{Result, UnderwritingError};
use crate::metrics::{Assumptions, MAX_HOLD_YEARS};
use crate::narrative::NarrativeConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassificationConfig {
    #[schemars(description = "Distinct rent-roll keyword columns needed to classify a table as a rent roll.")]
    pub rent_roll_min_matches: usize,
    #[schemars(description = "Distinct operating-statement keyword columns needed to classify a table as a T12.")]
    pub t12_min_matches: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            rent_roll_min_matches: 3,
            t12_min_matches: 2,
        }
    }
}

/// Text-based tiers tried after structured tables, in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    #[schemars(description = "Line and sliding-window heuristics over raw page text.")]
    LineHeuristic,
    #[schemars(description = "Literal 'Label: value' extraction of already-aggregated totals.")]
    LabeledSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    pub classification: ClassificationConfig,

    #[schemars(description = "Rent amounts recovered from text at or below this value are discarded as unit numbers or areas.")]
    pub rent_roll_min_reliable_amount: f64,

    pub fallback_order: Vec<FallbackTier>,

    pub assumptions: Assumptions,

    pub narrative: NarrativeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classification: ClassificationConfig::default(),
            rent_roll_min_reliable_amount: 1000.0,
            fallback_order: vec![FallbackTier::LineHeuristic, FallbackTier::LabeledSummary],
            assumptions: Assumptions::default(),
            narrative: NarrativeConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.classification.rent_roll_min_matches == 0
            || self.classification.t12_min_matches == 0
        {
            return Err(UnderwritingError::InvalidConfig(
                "classification thresholds must be at least 1".to_string(),
            ));
        }

        if !self.rent_roll_min_reliable_amount.is_finite() {
            return Err(UnderwritingError::InvalidConfig(format!(
                "rent_roll_min_reliable_amount must be finite, got {}",
                self.rent_roll_min_reliable_amount
            )));
        }

        let a = &self.assumptions;
        for (name, ratio) in [
            ("debt_service_ratio", a.debt_service_ratio),
            ("equity_ratio", a.equity_ratio),
        ] {
            if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                return Err(UnderwritingError::InvalidConfig(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, ratio
                )));
            }
        }

        if !a.noi_growth_rate.is_finite() || !a.placeholder_purchase_price.is_finite() {
            return Err(UnderwritingError::InvalidConfig(
                "assumptions must be finite numbers".to_string(),
            ));
        }

        if !(1..=MAX_HOLD_YEARS).contains(&a.hold_years) {
            return Err(UnderwritingError::InvalidConfig(format!(
                "hold_years must be between 1 and {}, got {}",
                MAX_HOLD_YEARS, a.hold_years
            )));
        }

        self.narrative.validate()
    }

    pub fn json_schema() -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(schemars::schema_for!(PipelineConfig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.classification.rent_roll_min_matches, 3);
        assert_eq!(config.classification.t12_min_matches, 2);
        assert_eq!(config.rent_roll_min_reliable_amount, 1000.0);
        assert_eq!(
            config.fallback_order,
            vec![FallbackTier::LineHeuristic, FallbackTier::LabeledSummary]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"classification": {"t12_min_matches": 3}, "fallback_order": ["labeled_summary"]}"#,
        )
        .unwrap();
        assert_eq!(config.classification.rent_roll_min_matches, 3);
        assert_eq!(config.classification.t12_min_matches, 3);
        assert_eq!(config.fallback_order, vec![FallbackTier::LabeledSummary]);
        assert_eq!(config.assumptions, Assumptions::default());
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let err = PipelineConfig::from_json_str(r#"{"assumptions": {"equity_ratio": 1.5}}"#)
            .unwrap_err();
        assert!(matches!(err, UnderwritingError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = PipelineConfig::from_json_str(r#"{"classification": {"rent_roll_min_matches": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, UnderwritingError::InvalidConfig(_)));
    }

    #[test]
    fn test_hold_years_bounded() {
        for raw in [r#"{"assumptions": {"hold_years": 0}}"#, r#"{"assumptions": {"hold_years": 51}}"#] {
            let err = PipelineConfig::from_json_str(raw).unwrap_err();
            assert!(matches!(err, UnderwritingError::InvalidConfig(_)));
        }
        let config = PipelineConfig::from_json_str(r#"{"assumptions": {"hold_years": 50}}"#).unwrap();
        assert_eq!(config.assumptions.hold_years, MAX_HOLD_YEARS);
    }

    #[test]
    fn test_schema_exports() {
        let schema = PipelineConfig::json_schema().unwrap();
        assert!(schema["properties"]["fallback_order"].is_object());
    }
}
