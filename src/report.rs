use crate::aggregation::Aggregator;
use crate::classifier::TableClassifier;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::{
    extract_tables_from_documents, fallback_sources_from_documents, text_bearing_sources,
    DocumentTextSource, TextSource,
};
use crate::metrics::compute_metrics_with;
use crate::narrative::{NarrativeExtractor, NarrativeFields};
use crate::overrides::{keys, Overrides};
use crate::schema::{Document, MetricsResult, RentRollSummary, T12Summary};
use crate::text_parsers::{DebugSink, NoopDebugSink};
use crate::utils::finite_or_none;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Flat headline block for dashboards. Every figure honours the same
/// overrides the metrics were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct QuickSummary {
    pub property: Option<String>,
    pub address: Option<String>,
    pub year_built: Option<String>,
    pub sqft: Option<f64>,
    pub noi: Option<f64>,
    pub expenses: Option<f64>,
    pub gpr: Option<f64>,
    pub current_rent_total: Option<f64>,
    pub market_rent_total: Option<f64>,
    pub irr_5yr: Option<f64>,
    pub rent_gap_pct: Option<f64>,
    pub cap_rate: Option<f64>,
    pub dscr: Option<f64>,
    pub coc_return: Option<f64>,
    pub price_per_sqft: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub break_even_occupancy: Option<f64>,
}

impl QuickSummary {
    pub fn build(
        narrative: &NarrativeFields,
        t12: &T12Summary,
        rent_roll: &RentRollSummary,
        metrics: &MetricsResult,
        overrides: &Overrides,
    ) -> Self {
        Self {
            property: narrative.property_name.clone(),
            address: narrative.property_address.clone(),
            year_built: narrative.year_built.clone(),
            sqft: overrides.resolve(keys::TOTAL_BUILDING_SQFT, narrative.total_building_sqft),
            noi: overrides.resolve(keys::NET_OPERATING_INCOME, t12.net_operating_income),
            expenses: overrides.resolve(keys::OPERATING_EXPENSES, t12.operating_expenses),
            gpr: overrides.resolve(keys::GROSS_POTENTIAL_RENT, t12.gross_potential_rent),
            current_rent_total: metrics
                .current_rent_total
                .or_else(|| overrides.resolve(keys::CURRENT_RENT_TOTAL, rent_roll.current_rent_total)),
            market_rent_total: metrics
                .market_rent_total
                .or_else(|| overrides.resolve(keys::MARKET_RENT_TOTAL, rent_roll.market_rent_total)),
            irr_5yr: metrics.irr_5yr,
            rent_gap_pct: metrics.rent_gap_pct,
            cap_rate: metrics.cap_rate,
            dscr: metrics.dscr,
            coc_return: metrics.coc_return,
            price_per_sqft: metrics.price_per_sqft,
            price_per_unit: metrics.price_per_unit,
            break_even_occupancy: metrics.break_even_occupancy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct UnderwritingReport {
    pub rent_roll_summary: RentRollSummary,
    pub t12_summary: T12Summary,
    pub narrative_fields: NarrativeFields,
    pub metrics: MetricsResult,
    pub quick_summary: QuickSummary,
}

fn scrub(value: Option<f64>) -> Option<f64> {
    value.and_then(finite_or_none)
}

impl UnderwritingReport {
    /// Copy of the report with every NaN or infinite number replaced by `None`.
    pub fn sanitized(&self) -> Self {
        let rr = &self.rent_roll_summary;
        let t12 = &self.t12_summary;
        let n = &self.narrative_fields;
        let q = &self.quick_summary;
        Self {
            rent_roll_summary: RentRollSummary {
                total_units: rr.total_units,
                current_rent_total: scrub(rr.current_rent_total),
                market_rent_total: scrub(rr.market_rent_total),
                rent_gap_pct: scrub(rr.rent_gap_pct),
            },
            t12_summary: T12Summary {
                gross_potential_rent: scrub(t12.gross_potential_rent),
                vacancy: scrub(t12.vacancy),
                other_income: scrub(t12.other_income),
                effective_gross_income: scrub(t12.effective_gross_income),
                operating_expenses: scrub(t12.operating_expenses),
                net_operating_income: scrub(t12.net_operating_income),
            },
            narrative_fields: NarrativeFields {
                total_units_or_suites: scrub(n.total_units_or_suites),
                total_building_sqft: scrub(n.total_building_sqft),
                ..n.clone()
            },
            metrics: self.metrics.clone().sanitized(),
            quick_summary: QuickSummary {
                sqft: scrub(q.sqft),
                noi: scrub(q.noi),
                expenses: scrub(q.expenses),
                gpr: scrub(q.gpr),
                current_rent_total: scrub(q.current_rent_total),
                market_rent_total: scrub(q.market_rent_total),
                irr_5yr: scrub(q.irr_5yr),
                rent_gap_pct: scrub(q.rent_gap_pct),
                cap_rate: scrub(q.cap_rate),
                dscr: scrub(q.dscr),
                coc_return: scrub(q.coc_return),
                price_per_sqft: scrub(q.price_per_sqft),
                price_per_unit: scrub(q.price_per_unit),
                break_even_occupancy: scrub(q.break_even_occupancy),
                ..q.clone()
            },
        }
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.sanitized())?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.sanitized())?)
    }
}

/// Documents in, underwriting report out.
pub struct UnderwritingPipeline {
    config: PipelineConfig,
    classifier: TableClassifier,
}

impl Default for UnderwritingPipeline {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            classifier: TableClassifier::default(),
        }
    }
}

impl UnderwritingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = TableClassifier::from_config(&config.classification);
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline, reading fallback text from the documents themselves.
    pub fn run(
        &self,
        documents: &[Document],
        narrative: &NarrativeFields,
        overrides: &Overrides,
    ) -> UnderwritingReport {
        let text_source = DocumentTextSource::from_documents(documents);
        let sources = text_bearing_sources(documents);
        self.underwrite(documents, narrative, overrides, &sources, &text_source, &NoopDebugSink)
    }

    /// Asks `extractor` for the narrative facts first. A failing extractor
    /// leaves the narrative empty; the financial figures are still produced.
    pub fn run_with_extractor(
        &self,
        documents: &[Document],
        extractor: &dyn NarrativeExtractor,
        overrides: &Overrides,
    ) -> UnderwritingReport {
        let narrative = extractor
            .extract(documents, &self.config.narrative)
            .unwrap_or_else(|e| {
                warn!("Narrative extraction failed, continuing without it: {}", e);
                NarrativeFields::default()
            });
        self.run(documents, &narrative, overrides)
    }

    /// Reads fallback text for every document source through `text_source`.
    pub fn run_with(
        &self,
        documents: &[Document],
        narrative: &NarrativeFields,
        overrides: &Overrides,
        text_source: &dyn TextSource,
        debug_sink: &dyn DebugSink,
    ) -> UnderwritingReport {
        let sources = fallback_sources_from_documents(documents);
        self.underwrite(documents, narrative, overrides, &sources, text_source, debug_sink)
    }

    fn underwrite(
        &self,
        documents: &[Document],
        narrative: &NarrativeFields,
        overrides: &Overrides,
        sources: &[String],
        text_source: &dyn TextSource,
        debug_sink: &dyn DebugSink,
    ) -> UnderwritingReport {
        info!("Underwriting {} documents", documents.len());
        for key in overrides.unknown_keys() {
            warn!("Override {:?} is not a recognised key and will be ignored", key);
        }
        for key in overrides.unusable_keys() {
            warn!("Override {:?} is not numeric and will be ignored", key);
        }

        let buckets = extract_tables_from_documents(documents, &self.classifier);
        debug!("Fallback sources: {:?}", sources);

        let aggregator = Aggregator::new(&self.config, text_source).with_debug_sink(debug_sink);
        let rent_roll_summary = aggregator.rent_roll(&buckets.rent_roll, sources);
        let t12_summary = aggregator.t12(&buckets.t12, sources);

        let metrics = compute_metrics_with(
            &t12_summary,
            &rent_roll_summary,
            narrative,
            overrides,
            &self.config.assumptions,
        );
        let quick_summary =
            QuickSummary::build(narrative, &t12_summary, &rent_roll_summary, &metrics, overrides);

        UnderwritingReport {
            rent_roll_summary,
            t12_summary,
            narrative_fields: narrative.clone(),
            metrics,
            quick_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnderwritingError;
    use crate::schema::Table;

    struct FailingExtractor;

    impl NarrativeExtractor for FailingExtractor {
        fn extract(&self, _: &[Document], _: &crate::narrative::NarrativeConfig) -> Result<NarrativeFields> {
            Err(UnderwritingError::NarrativeExtraction("model unavailable".to_string()))
        }
    }

    fn deal_documents() -> Vec<Document> {
        let t12 = Table::new(["Income & Expenses", "Total"])
            .with_row(["Gross Potential Rent", "500,000"])
            .with_row(["Vacancy", "25,000"])
            .with_row(["Operating Expenses", "150,000"]);
        vec![
            Document::from_table("t12.xlsx", t12),
            Document::from_text("om.pdf", 1, "Offering memorandum"),
        ]
    }

    #[test]
    fn test_run_end_to_end() {
        let narrative = NarrativeFields {
            property_name: Some("Oak Plaza".to_string()),
            total_building_sqft: Some(50_000.0),
            ..Default::default()
        };
        let report = UnderwritingPipeline::default().run(&deal_documents(), &narrative, &Overrides::new());

        assert_eq!(report.t12_summary.net_operating_income, Some(325_000.0));
        assert!(report.rent_roll_summary.is_empty());
        assert_eq!(report.metrics.purchase_price, Some(5_000_000.0));
        assert_eq!(report.quick_summary.property.as_deref(), Some("Oak Plaza"));
        assert_eq!(report.quick_summary.noi, Some(325_000.0));
        assert_eq!(report.quick_summary.price_per_sqft, Some(100.0));
    }

    #[test]
    fn test_quick_summary_agrees_with_overrides() {
        let overrides = Overrides::new()
            .with(keys::NET_OPERATING_INCOME, 400_000)
            .with(keys::OPERATING_EXPENSES, 100_000)
            .with(keys::GROSS_POTENTIAL_RENT, 600_000)
            .with(keys::CURRENT_RENT_TOTAL, 90_000)
            .with(keys::PURCHASE_PRICE, 5_000_000);
        let report =
            UnderwritingPipeline::default().run(&deal_documents(), &NarrativeFields::default(), &overrides);

        assert_eq!(report.t12_summary.net_operating_income, Some(325_000.0));
        assert_eq!(report.metrics.cap_rate, Some(0.08));

        let quick = &report.quick_summary;
        assert_eq!(quick.noi, Some(400_000.0));
        assert_eq!(quick.expenses, Some(100_000.0));
        assert_eq!(quick.gpr, Some(600_000.0));
        assert_eq!(quick.current_rent_total, Some(90_000.0));
        assert_eq!(quick.cap_rate, report.metrics.cap_rate);
    }

    #[test]
    fn test_failing_extractor_still_produces_metrics() {
        let report = UnderwritingPipeline::default().run_with_extractor(
            &deal_documents(),
            &FailingExtractor,
            &Overrides::new(),
        );
        assert_eq!(report.narrative_fields, NarrativeFields::default());
        assert!(report.metrics.cap_rate.is_some());
    }

    #[test]
    fn test_to_json_scrubs_non_finite() {
        let mut report = UnderwritingReport::default();
        report.t12_summary.net_operating_income = Some(f64::NAN);
        report.quick_summary.cap_rate = Some(f64::INFINITY);

        let value = report.to_json_value().unwrap();
        assert!(value["t12_summary"]["net_operating_income"].is_null());
        assert!(value["quick_summary"]["cap_rate"].is_null());
        assert!(report.to_json().unwrap().contains("\"metrics\""));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            rent_roll_min_reliable_amount: f64::NAN,
            ..Default::default()
        };
        assert!(UnderwritingPipeline::new(config).is_err());
    }
}
