use crate::aggregation::AggregatedRow;
use crate::chart_of_accounts::is_asset_code;
use crate::schema::{AnalysisConfig, Priority};
use crate::variation::{VariationResult, VariationTag};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionReason {
    /// Passed the percentage, absolute and minimum-value gates.
    Material,
    FocusAccount,
    FocusPeriodPair,
    SignAnomaly,
    NewOrDisappeared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedVariation {
    pub variation: VariationResult,
    pub priority: Priority,
    pub reasons: BTreeSet<InclusionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_share_pp: Option<f64>,
}

impl ClassifiedVariation {
    pub fn is_forced(&self) -> bool {
        self.variation.has_tag(VariationTag::Forced)
    }

    pub fn with_revenue_share(mut self, revenue_totals: &BTreeMap<String, f64>) -> Self {
        self.revenue_share_pp = self.variation.revenue_share_pp(revenue_totals);
        self
    }
}

/// Credit balance on an asset-range account, found on the balance itself
/// rather than on a comparison pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAnomaly {
    pub period: String,
    pub value: f64,
}

pub struct MaterialityClassifier<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> MaterialityClassifier<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn passes_thresholds(&self, variation: &VariationResult) -> bool {
        variation.variation_pct.abs() >= self.config.threshold_pct
            && variation.variation_abs.abs() >= self.config.threshold_abs
            && variation.max_abs_value() >= self.config.min_value
    }

    /// Asset-range account closing the compared period with a credit balance.
    pub fn is_sign_anomaly(&self, variation: &VariationResult) -> bool {
        variation.value_compare < 0.0
            && is_asset_code(&variation.account_code, &self.config.asset_code_prefixes)
    }

    /// Returns `None` when the variation is neither material nor forced in by
    /// an override. Tags for the overrides are added to the returned copy.
    pub fn classify(&self, variation: &VariationResult) -> Option<ClassifiedVariation> {
        let mut reasons = BTreeSet::new();
        let mut variation = variation.clone();

        if self.passes_thresholds(&variation) {
            reasons.insert(InclusionReason::Material);
        }

        if self.config.is_focus_account(&variation.account_code) {
            reasons.insert(InclusionReason::FocusAccount);
        }
        if self
            .config
            .is_focus_pair(&variation.base_period, &variation.compare_period)
        {
            reasons.insert(InclusionReason::FocusPeriodPair);
        }
        if reasons.contains(&InclusionReason::FocusAccount)
            || reasons.contains(&InclusionReason::FocusPeriodPair)
        {
            variation.tags.insert(VariationTag::Forced);
        }

        if self.is_sign_anomaly(&variation) {
            variation.tags.insert(VariationTag::SignAnomaly);
            reasons.insert(InclusionReason::SignAnomaly);
        }

        if variation.is_new_or_disappeared() && variation.max_abs_value() >= self.config.min_value {
            reasons.insert(InclusionReason::NewOrDisappeared);
        }

        if reasons.is_empty() {
            return None;
        }

        let priority = self.priority_for(&variation);
        debug!(
            "Account {} {}->{}: {:.1}% included as {:?} ({:?})",
            variation.account_code,
            variation.base_period,
            variation.compare_period,
            variation.variation_pct,
            priority,
            reasons
        );

        Some(ClassifiedVariation {
            variation,
            priority,
            reasons,
            revenue_share_pp: None,
        })
    }

    pub fn priority_for(&self, variation: &VariationResult) -> Priority {
        let pct = variation.variation_pct.abs();
        if variation.has_tag(VariationTag::SignAnomaly)
            || variation.is_new_or_disappeared()
            || pct >= 2.0 * self.config.threshold_pct
        {
            Priority::Alta
        } else if pct >= self.config.threshold_pct {
            Priority::Media
        } else {
            Priority::Baja
        }
    }

    pub fn classify_all(&self, variations: &[VariationResult]) -> Vec<ClassifiedVariation> {
        variations.iter().filter_map(|v| self.classify(v)).collect()
    }

    /// Sign check on the most recent computable balance, independent of any
    /// variation. `recent_periods` is ordered most recent first.
    pub fn balance_anomaly(&self, row: &AggregatedRow, recent_periods: &[String]) -> Option<BalanceAnomaly> {
        if !is_asset_code(&row.account_code, &self.config.asset_code_prefixes) {
            return None;
        }
        let (period, value) = recent_periods
            .iter()
            .find_map(|period| row.value(period).map(|value| (period, value)))?;
        if value >= 0.0 {
            return None;
        }

        debug!(
            "Account {}: credit balance {} in {} on an asset account",
            row.account_code, value, period
        );
        Some(BalanceAnomaly {
            period: period.clone(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::compute_delta;

    fn variation(code: &str, base: f64, compare: f64) -> VariationResult {
        let (variation_abs, variation_pct, tags) = compute_delta(Some(base), Some(compare)).unwrap();
        VariationResult {
            account_code: code.to_string(),
            base_period: "FY23".to_string(),
            compare_period: "FY24".to_string(),
            value_base: base,
            value_compare: compare,
            variation_abs,
            variation_pct,
            tags,
        }
    }

    #[test]
    fn test_material_alta_at_double_threshold() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);

        let classified = classifier.classify(&variation("6290000", 100_000.0, 150_000.0)).unwrap();
        assert_eq!(classified.priority, Priority::Alta);
        assert!(classified.reasons.contains(&InclusionReason::Material));
        assert!(!classified.is_forced());
    }

    #[test]
    fn test_media_between_one_and_two_thresholds() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);

        let classified = classifier.classify(&variation("6290000", 500_000.0, 575_000.0)).unwrap();
        assert_eq!(classified.priority, Priority::Media);
    }

    #[test]
    fn test_baja_when_pct_gate_lowered() {
        let config = AnalysisConfig {
            threshold_pct: 0.0,
            ..AnalysisConfig::default()
        };
        let classifier = MaterialityClassifier::new(&config);
        let v = variation("6290000", 1_000_000.0, 1_060_000.0);
        assert!(classifier.passes_thresholds(&v));
        // 6% is at least 2 x 0, so the pct rule alone would say Alta.
        assert_eq!(classifier.classify(&v).unwrap().priority, Priority::Alta);

        let config = AnalysisConfig {
            threshold_pct: 5.0,
            ..AnalysisConfig::default()
        };
        let classifier = MaterialityClassifier::new(&config);
        let v = variation("6290000", 10_000_000.0, 9_400_000.0);
        assert_eq!(classifier.classify(&v).unwrap().priority, Priority::Media);
        assert_eq!(
            classifier.priority_for(&variation("6290000", 10_000_000.0, 10_200_000.0)),
            Priority::Baja
        );
    }

    #[test]
    fn test_each_gate_is_required() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);

        // pct too small
        assert!(classifier.classify(&variation("6290000", 10_000_000.0, 10_500_000.0)).is_none());
        // abs too small
        assert!(classifier.classify(&variation("6290000", 100_000.0, 140_000.0)).is_none());
        // below minimum value
        assert!(classifier.classify(&variation("6290000", 40_000.0, 95_000.0)).is_none());
    }

    #[test]
    fn test_new_account_included_when_min_value_met() {
        let config = AnalysisConfig {
            threshold_abs: 1_000_000.0,
            ..AnalysisConfig::default()
        };
        let classifier = MaterialityClassifier::new(&config);

        let classified = classifier.classify(&variation("6290000", 0.0, 120_000.0)).unwrap();
        assert!(classified.reasons.contains(&InclusionReason::NewOrDisappeared));
        assert!(!classified.reasons.contains(&InclusionReason::Material));
        assert_eq!(classified.priority, Priority::Alta);

        assert!(classifier.classify(&variation("6290000", 0.0, 80_000.0)).is_none());
    }

    #[test]
    fn test_sign_anomaly_forces_alta() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);

        let classified = classifier.classify(&variation("5720001", -19_000.0, -20_000.0)).unwrap();
        assert!(classified.variation.has_tag(VariationTag::SignAnomaly));
        assert!(classified.reasons.contains(&InclusionReason::SignAnomaly));
        assert_eq!(classified.priority, Priority::Alta);

        // Liabilities are naturally credit.
        assert!(classifier.classify(&variation("4000000", -19_000.0, -20_000.0)).is_none());
    }

    #[test]
    fn test_balance_anomaly_without_pairs() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);
        let recent = vec!["YTD25".to_string(), "FY24".to_string()];

        let row = |code: &str, values: &[(&str, Option<f64>)]| AggregatedRow {
            account_code: code.to_string(),
            description: "Bancos".to_string(),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };

        let anomaly = classifier
            .balance_anomaly(&row("5720001", &[("YTD25", Some(-20_000.0))]), &recent)
            .unwrap();
        assert_eq!(anomaly.period, "YTD25");
        assert_eq!(anomaly.value, -20_000.0);

        // Most recent computable period decides
        let recovered = row("5720001", &[("FY24", Some(-5_000.0)), ("YTD25", Some(1_000.0))]);
        assert!(classifier.balance_anomaly(&recovered, &recent).is_none());
        let poisoned = row("5720001", &[("FY24", Some(-5_000.0)), ("YTD25", None)]);
        assert_eq!(classifier.balance_anomaly(&poisoned, &recent).unwrap().period, "FY24");

        assert!(classifier
            .balance_anomaly(&row("4000000", &[("YTD25", Some(-20_000.0))]), &recent)
            .is_none());
    }

    #[test]
    fn test_focus_overrides_tag_forced() {
        let mut config = AnalysisConfig::default();
        config.focus_accounts.insert("7000001".to_string());
        config
            .focus_period_pairs
            .insert(("FY23".to_string(), "FY24".to_string()));
        let classifier = MaterialityClassifier::new(&config);

        let by_account = classifier.classify(&variation("7000001", 100_000.0, 102_000.0)).unwrap();
        assert!(by_account.is_forced());
        assert!(by_account.reasons.contains(&InclusionReason::FocusAccount));
        assert_eq!(by_account.priority, Priority::Baja);

        let by_pair = classifier.classify(&variation("6290000", 10.0, 11.0)).unwrap();
        assert!(by_pair.is_forced());
        assert!(by_pair.reasons.contains(&InclusionReason::FocusPeriodPair));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let config = AnalysisConfig::default();
        let classifier = MaterialityClassifier::new(&config);
        let inputs = vec![
            variation("6290000", 100_000.0, 150_000.0),
            variation("5720001", 10.0, -20_000.0),
            variation("7000001", 0.0, 200_000.0),
            variation("6400000", 1.0, 1.0),
        ];

        let first = classifier.classify_all(&inputs);
        let second = classifier.classify_all(&inputs);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
