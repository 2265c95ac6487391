//! # Due Diligence Q&A
//!
//! A library for finding materially anomalous line items in a multi-period
//! trial balance and turning them into explainable audit questions.
//!
//! ## Core Concepts
//!
//! - **Period detection**: monthly column labels (`ene-24`, `August 2025`, `2024-03`) are grouped
//!   into complete (12 months) and incomplete fiscal years
//! - **Aggregation**: complete years become `FY{yy}` buckets, incomplete years `YTD{yy}`, and the
//!   prior year gets a `YTD{yy}` window over the same calendar months
//! - **Variation & materiality**: each comparable pair is measured and gated by percentage,
//!   absolute and minimum-value thresholds, with focus and sign-anomaly overrides
//! - **Synthesis**: reportable accounts become multi-part questions with a short reason,
//!   from deterministic templates or an external generator fed with anonymized facts
//! - **Report**: items grouped by statement and priority plus a fixed audit checklist
//!
//! ## Example
//!
//! ```rust,ignore
//! use due_diligence_qa::*;
//!
//! let table = BalanceTable::from_rows(vec![
//!     RawBalanceRow::new("7000001", "Ventas de mercaderías")
//!         .with_value("ene-24", 100_000.0)
//!         .with_value("ene-25", 150_000.0),
//! ]);
//!
//! let config = AnalysisConfig::default();
//! let report = analyze_balance(&table, &config).unwrap();
//! for item in &report.items {
//!     println!("{} {:?}: {}", item.account_code, item.priority, item.question.primary());
//! }
//! ```

pub mod aggregation;
pub mod anonymizer;
pub mod chart_of_accounts;
pub mod checklist;
pub mod error;
pub mod materiality;
pub mod periods;
pub mod report;
pub mod rules;
pub mod schema;
pub mod synthesis;
pub mod templates;
pub mod utils;
pub mod variation;

#[cfg(feature = "gemini")]
pub mod llm;

pub use aggregation::{AggregatedRow, AggregationPlan, Aggregator};
pub use anonymizer::{AnonymizedFact, AnonymizedFinding, FactAnonymizer, ValueRange};
pub use chart_of_accounts::{AccountEntry, ChartOfAccounts, IlvMapping};
pub use checklist::{standard_checklist, ChecklistItem, CHECKLIST_VERSION};
pub use error::{BalanceAnalysisError, Result};
pub use materiality::{BalanceAnomaly, ClassifiedVariation, InclusionReason, MaterialityClassifier};
pub use periods::{detect_periods, detect_periods_strict, PeriodColumn, PeriodDetection, PeriodKind};
pub use report::{AuditUpdate, QaItem, QaReport, ReportAssembler, VariationSummary};
pub use schema::*;
pub use synthesis::{
    AccountFinding, ExternalSynthesizer, GeneratedBy, GenerationRequest, QuestionSynthesizer, SynthesisInput,
    SynthesizedText, TemplateSynthesizer, TextGenerator,
};
pub use templates::{Intensity, VariationDirection};
pub use variation::{VariationCalculator, VariationResult, VariationTag};

use chart_of_accounts::{account_type_for_code, is_revenue_code};
use log::{debug, info, warn};
use report::ReportData;
use std::collections::{BTreeMap, BTreeSet};

/// Runs the whole analysis for one balance. Holds only borrowed, immutable
/// state, so one analyzer can serve many tables.
pub struct BalanceAnalyzer<'a> {
    config: &'a AnalysisConfig,
    synthesizer: Option<&'a dyn QuestionSynthesizer>,
}

impl<'a> BalanceAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            synthesizer: None,
        }
    }

    /// Replaces the built-in templates. If the synthesizer fails for an
    /// account, that account falls back to the templates.
    pub fn with_synthesizer(mut self, synthesizer: &'a dyn QuestionSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn analyze(&self, table: &BalanceTable) -> Result<QaReport> {
        self.config.validate()?;

        info!(
            "Analysing balance: {} rows, {} columns",
            table.rows.len(),
            table.columns.len()
        );

        let mut warnings = Vec::new();
        let rows = unique_rows(table, &mut warnings);

        let detection = detect_periods(&table.columns);
        warnings.extend(detection.warnings.iter().cloned());
        info!(
            "Detected {} complete and {} incomplete years",
            detection.complete_years().len(),
            detection.incomplete_years().len()
        );

        let plan = AggregationPlan::from_detection(&detection);
        for column in plan.unavailable_columns() {
            let message = format!(
                "{} is not available: the prior year lacks some of the months being compared",
                column.key
            );
            warn!("{}", message);
            warnings.push(message);
        }

        let aggregated = Aggregator::new(&plan).aggregate(&rows);
        let analysis_periods = plan.analysis_periods();
        let recent_periods = plan.recent_periods();
        let revenue_totals = revenue_totals(&aggregated, &analysis_periods);

        let calculator = VariationCalculator::new(self.config.trend_sensitivity_pp);
        let classifier = MaterialityClassifier::new(self.config);
        let anonymizer = FactAnonymizer::new(self.config.anonymize_mode, self.config.language);
        let templates = TemplateSynthesizer::new(self.config.language);

        let mut items = Vec::new();
        for row in &aggregated {
            let (variations, skipped) = calculator.calculate_account(row, &plan.comparison_pairs);
            if !skipped.is_empty() {
                debug!(
                    "Account {}: {} comparison(s) not computable",
                    row.account_code,
                    skipped.len()
                );
            }

            let classified: Vec<ClassifiedVariation> = classifier
                .classify_all(&variations)
                .into_iter()
                .map(|c| c.with_revenue_share(&revenue_totals))
                .collect();
            let balance_anomaly = if classified
                .iter()
                .any(|c| c.variation.has_tag(VariationTag::SignAnomaly))
            {
                None
            } else {
                classifier.balance_anomaly(row, &recent_periods)
            };

            if classified.is_empty() && balance_anomaly.is_none() {
                if !skipped.is_empty() {
                    let message = format!(
                        "Account {}: periods {} not computable; row is incomplete",
                        row.account_code,
                        row.incomplete_periods().join(", ")
                    );
                    warn!("{}", message);
                    warnings.push(message);
                }
                continue;
            }

            let finding = AccountFinding {
                account_code: row.account_code.clone(),
                description: row.description.clone(),
                account_type: account_type_for_code(&row.account_code),
                variations: classified,
                balance_anomaly,
            };
            let text = self.synthesize(&finding, &anonymizer, &templates, &mut warnings);
            items.push(QaItem::from_finding(&finding, row, text, &revenue_totals));
        }

        let data = ReportData {
            analysis_periods,
            comparison_pairs: plan.comparison_pairs.clone(),
            period_values: aggregated
                .iter()
                .map(|row| (row.account_code.clone(), row.flat_values()))
                .collect(),
            revenue_totals,
            accounts: aggregated
                .iter()
                .map(|row| (row.account_code.clone(), row.description.clone()))
                .collect(),
            warnings,
        };

        Ok(ReportAssembler::new(self.config.language).assemble(items, data))
    }

    fn synthesize(
        &self,
        finding: &AccountFinding,
        anonymizer: &FactAnonymizer,
        templates: &TemplateSynthesizer,
        warnings: &mut Vec<String>,
    ) -> SynthesizedText {
        let Some(synthesizer) = self.synthesizer else {
            return templates.render(&SynthesisInput::Raw(finding));
        };

        let result = if synthesizer.is_external() && self.config.anonymize_mode != AnonymizeMode::None {
            let anonymized = anonymizer.anonymize_finding(finding);
            synthesizer.synthesize(&SynthesisInput::Anonymized(&anonymized))
        } else {
            synthesizer.synthesize(&SynthesisInput::Raw(finding))
        };

        match result {
            Ok(text) => text,
            Err(err) => {
                let message = format!(
                    "Account {}: {}; using template text",
                    finding.account_code, err
                );
                warn!("{}", message);
                warnings.push(message);

                let mut text = templates.render(&SynthesisInput::Raw(finding));
                text.generated_by = GeneratedBy::TemplateFallback;
                text
            }
        }
    }
}

pub fn analyze_balance(table: &BalanceTable, config: &AnalysisConfig) -> Result<QaReport> {
    BalanceAnalyzer::new(config).analyze(table)
}

fn unique_rows(table: &BalanceTable, warnings: &mut Vec<String>) -> Vec<RawBalanceRow> {
    let mut seen = BTreeSet::new();
    let mut rows = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        if seen.insert(row.account_code.clone()) {
            rows.push(row.clone());
        } else {
            let err = BalanceAnalysisError::DuplicateAccount(row.account_code.clone());
            warn!("{}", err);
            warnings.push(err.to_string());
        }
    }

    rows
}

/// Sum of absolute group-7 balances per period.
fn revenue_totals(rows: &[AggregatedRow], periods: &[String]) -> BTreeMap<String, f64> {
    periods
        .iter()
        .map(|period| {
            let total = rows
                .iter()
                .filter(|row| is_revenue_code(&row.account_code))
                .filter_map(|row| row.value(period))
                .map(f64::abs)
                .sum();
            (period.clone(), total)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ES_MONTHS: [&str; 12] = [
        "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
    ];

    /// Spreads each yearly amount evenly over the months present.
    fn row(code: &str, description: &str, years: &[(&str, usize, f64)]) -> RawBalanceRow {
        let mut row = RawBalanceRow::new(code, description);
        for (yy, months, total) in years {
            for month in &ES_MONTHS[..*months] {
                row = row.with_value(format!("{}-{}", month, yy), total / *months as f64);
            }
        }
        row
    }

    fn sample_table() -> BalanceTable {
        BalanceTable::from_rows(vec![
            row("7000001", "Ventas de mercaderías", &[("24", 12, -1_200_000.0), ("25", 8, -1_200_000.0)]),
            row("6400000", "Sueldos y salarios", &[("24", 12, 600_000.0), ("25", 8, 410_000.0)]),
            row("6290000", "Otros servicios", &[("24", 12, 24_000.0), ("25", 8, 16_000.0)]),
            row("5720001", "Bancos", &[("24", 12, 1_200_000.0), ("25", 8, -160_000.0)]),
        ])
    }

    struct FailingSynthesizer;

    impl QuestionSynthesizer for FailingSynthesizer {
        fn synthesize(&self, _input: &SynthesisInput<'_>) -> Result<SynthesizedText> {
            Err(BalanceAnalysisError::ExternalGeneratorFailure("service unavailable".to_string()))
        }

        fn is_external(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_end_to_end_analysis() {
        let config = AnalysisConfig::default();
        let report = analyze_balance(&sample_table(), &config).unwrap();

        assert_eq!(report.analysis_periods, vec!["FY24", "YTD24", "YTD25"]);
        assert_eq!(
            report.comparison_pairs,
            vec![("YTD24".to_string(), "YTD25".to_string())]
        );

        // YTD24 revenue = 8/12 of the year; YTD25 = 1.2M, +50%
        let revenue = report.item("7000001").expect("revenue should be reported");
        assert_eq!(revenue.priority, Priority::Alta);
        assert!((revenue.values["YTD24"] + 800_000.0).abs() < 1e-6);
        assert!(revenue.question.primary().contains("Ventas de mercaderías"));

        // Salaries 400k -> 410k: 2.5%, not material
        assert!(report.item("6400000").is_none());

        let bank = report.item("5720001").expect("credit bank balance must be flagged");
        assert!(bank.tags.contains(&VariationTag::SignAnomaly));
        assert_eq!(bank.priority, Priority::Alta);

        assert!(!report.checklist.is_empty());
        assert_eq!(report.period_values.len(), 4);
        assert!((report.revenue_totals["YTD25"] - 1_200_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config_is_the_only_hard_failure() {
        let config = AnalysisConfig {
            threshold_pct: f64::NAN,
            ..AnalysisConfig::default()
        };
        let err = analyze_balance(&sample_table(), &config).unwrap_err();
        assert!(matches!(err, BalanceAnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_accounts_keep_first() {
        let mut table = sample_table();
        table
            .rows
            .push(row("7000001", "Duplicada", &[("24", 12, 5.0), ("25", 8, 5.0)]));

        let report = analyze_balance(&table, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.item("7000001").unwrap().description, "Ventas de mercaderías");
        assert!(report.warnings.iter().any(|w| w.contains("Duplicate account code 7000001")));
    }

    #[test]
    fn test_failing_external_falls_back_to_templates() {
        let config = AnalysisConfig::default();
        let failing = FailingSynthesizer;
        let report = BalanceAnalyzer::new(&config)
            .with_synthesizer(&failing)
            .analyze(&sample_table())
            .unwrap();

        assert!(!report.items.is_empty());
        for item in &report.items {
            assert_eq!(item.generated_by, GeneratedBy::TemplateFallback);
            assert!(!item.question.is_empty());
        }
        assert!(report.warnings.iter().any(|w| w.contains("service unavailable")));
    }

    #[test]
    fn test_unrecognized_columns_are_warnings() {
        let mut table = sample_table();
        table.columns.push("Comentarios".to_string());

        let report = analyze_balance(&table, &AnalysisConfig::default()).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("Comentarios")));
        assert_eq!(report.analysis_periods, vec!["FY24", "YTD24", "YTD25"]);
    }
}
