use crate::chart_of_accounts::{account_type_for_code, ilv_mapping};
use crate::materiality::ClassifiedVariation;
use crate::schema::{inline_json_schema, AccountType, AnonymizeMode, Language, Priority};
use crate::synthesis::AccountFinding;
use crate::templates::{Intensity, VariationDirection};
use crate::variation::VariationTag;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound (exclusive) of the `Pequeno` value range.
pub const SMALL_VALUE_LIMIT: f64 = 100_000.0;
/// Upper bound (exclusive) of the `Mediano` value range.
pub const MEDIUM_VALUE_LIMIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValueRange {
    #[serde(rename = "pequeño")]
    Pequeno,
    Mediano,
    Grande,
}

impl ValueRange {
    pub fn from_value(value: f64) -> Self {
        let value = value.abs();
        if value < SMALL_VALUE_LIMIT {
            ValueRange::Pequeno
        } else if value < MEDIUM_VALUE_LIMIT {
            ValueRange::Mediano
        } else {
            ValueRange::Grande
        }
    }
}

/// Bucketed, non-identifying description of one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnonymizedFact {
    #[schemars(description = "Generic account family, e.g. 'cuenta de ingresos'")]
    pub category_generic: String,
    pub account_type: AccountType,
    #[schemars(description = "Coarse business grouping, only present in moderate mode")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_category: Option<String>,
    pub variation_direction: VariationDirection,
    pub variation_magnitude: Intensity,
    #[schemars(description = "Signed percentage change; ±100 for a zero base is a marker, not a ratio")]
    pub variation_percentage: f64,
    #[schemars(description = "Bucket of the larger absolute balance: <100k, <1M, otherwise grande")]
    pub value_range: ValueRange,
    pub priority_suggested: Priority,
    pub tags: BTreeSet<VariationTag>,
    pub base_period: String,
    pub compare_period: String,
}

impl AnonymizedFact {
    pub fn schema_as_json() -> serde_json::Result<serde_json::Value> {
        inline_json_schema::<AnonymizedFact>()
    }
}

/// All anonymized facts of one account, in comparison order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnonymizedFinding {
    pub account_type: AccountType,
    pub priority_suggested: Priority,
    pub facts: Vec<AnonymizedFact>,
    /// Period in which the asset account closed in credit, when that was found
    /// on the balance rather than on a variation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_anomaly_period: Option<String>,
}

pub struct FactAnonymizer {
    mode: AnonymizeMode,
    language: Language,
}

impl FactAnonymizer {
    pub fn new(mode: AnonymizeMode, language: Language) -> Self {
        Self { mode, language }
    }

    /// The account code is read only to derive the account type; no part of
    /// it, the description or any balance is copied into the result.
    pub fn anonymize(&self, account_code: &str, classified: &ClassifiedVariation) -> AnonymizedFact {
        let variation = &classified.variation;
        let account_type = account_type_for_code(account_code);

        let business_category = match self.mode {
            AnonymizeMode::Strict => None,
            AnonymizeMode::Moderate | AnonymizeMode::None => {
                ilv_mapping(account_code).map(|ilv| ilv.level2)
            }
        };

        AnonymizedFact {
            category_generic: account_type.generic_label(self.language).to_string(),
            account_type,
            business_category,
            variation_direction: VariationDirection::from_pct(variation.variation_pct),
            variation_magnitude: Intensity::from_pct(variation.variation_pct),
            variation_percentage: variation.variation_pct,
            value_range: ValueRange::from_value(variation.max_abs_value()),
            priority_suggested: classified.priority,
            tags: variation.tags.clone(),
            base_period: variation.base_period.clone(),
            compare_period: variation.compare_period.clone(),
        }
    }

    pub fn anonymize_account(&self, account_code: &str, classified: &[ClassifiedVariation]) -> AnonymizedFinding {
        let facts: Vec<AnonymizedFact> = classified
            .iter()
            .map(|c| self.anonymize(account_code, c))
            .collect();
        let priority_suggested = facts
            .iter()
            .map(|f| f.priority_suggested)
            .min()
            .unwrap_or(Priority::Baja);

        AnonymizedFinding {
            account_type: account_type_for_code(account_code),
            priority_suggested,
            facts,
            sign_anomaly_period: None,
        }
    }

    /// Only the period of a balance anomaly is kept, never its amount.
    pub fn anonymize_finding(&self, finding: &AccountFinding) -> AnonymizedFinding {
        let mut anonymized = self.anonymize_account(&finding.account_code, &finding.variations);
        if let Some(anomaly) = &finding.balance_anomaly {
            anonymized.sign_anomaly_period = Some(anomaly.period.clone());
            anonymized.priority_suggested = Priority::Alta;
        }
        anonymized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materiality::MaterialityClassifier;
    use crate::schema::AnalysisConfig;
    use crate::variation::{compute_delta, VariationResult};

    fn classified(code: &str, base: f64, compare: f64) -> ClassifiedVariation {
        let (variation_abs, variation_pct, tags) = compute_delta(Some(base), Some(compare)).unwrap();
        let config = AnalysisConfig::default();
        MaterialityClassifier::new(&config)
            .classify(&VariationResult {
                account_code: code.to_string(),
                base_period: "FY23".to_string(),
                compare_period: "FY24".to_string(),
                value_base: base,
                value_compare: compare,
                variation_abs,
                variation_pct,
                tags,
            })
            .unwrap()
    }

    fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::String(s) => out.push(s.clone()),
            serde_json::Value::Number(n) => out.push(n.to_string()),
            serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
            serde_json::Value::Object(map) => map.iter().for_each(|(k, v)| {
                out.push(k.clone());
                collect_strings(v, out);
            }),
            _ => {}
        }
    }

    #[test]
    fn test_buckets_are_fixed() {
        assert_eq!(ValueRange::from_value(99_999.0), ValueRange::Pequeno);
        assert_eq!(ValueRange::from_value(-100_000.0), ValueRange::Mediano);
        assert_eq!(ValueRange::from_value(1_000_000.0), ValueRange::Grande);
    }

    #[test]
    fn test_strict_and_moderate_modes() {
        let item = classified("6400000", 200_000.0, 300_000.0);

        let strict = FactAnonymizer::new(AnonymizeMode::Strict, Language::Es).anonymize("6400000", &item);
        assert_eq!(strict.business_category, None);
        assert_eq!(strict.account_type, AccountType::OperatingExpense);
        assert_eq!(strict.variation_direction, VariationDirection::Increment);
        assert_eq!(strict.variation_magnitude, Intensity::Moderado);
        assert_eq!(strict.value_range, ValueRange::Mediano);
        assert!((strict.variation_percentage - 50.0).abs() < 1e-9);

        let moderate = FactAnonymizer::new(AnonymizeMode::Moderate, Language::Es).anonymize("6400000", &item);
        assert_eq!(moderate.business_category.as_deref(), Some("OPEX"));
    }

    #[test]
    fn test_no_identifying_value_survives() {
        let code = "5720001";
        let description = "Banco Santander cuenta 0049";
        let (base, compare) = (123_456.78, -234_567.89);
        let item = classified(code, base, compare);

        for mode in [AnonymizeMode::Strict, AnonymizeMode::Moderate] {
            let finding = FactAnonymizer::new(mode, Language::Both).anonymize_account(code, &[item.clone()]);
            let json = serde_json::to_value(&finding).unwrap();

            let mut values = Vec::new();
            collect_strings(&json, &mut values);
            for value in &values {
                assert_ne!(value, code);
                assert_ne!(value, description);
                assert!(!value.contains(code));
                for amount in [base, compare, compare - base] {
                    assert_ne!(value, &amount.to_string());
                    if let Ok(number) = value.parse::<f64>() {
                        assert!((number - amount).abs() > 1e-6, "{} leaks {}", value, amount);
                    }
                }
            }
        }
    }

    #[test]
    fn test_balance_anomaly_keeps_period_only() {
        let finding = AccountFinding {
            account_code: "5720001".to_string(),
            description: "Bancos c/c".to_string(),
            account_type: AccountType::Asset,
            variations: Vec::new(),
            balance_anomaly: Some(crate::materiality::BalanceAnomaly {
                period: "YTD25".to_string(),
                value: -20_000.0,
            }),
        };

        let anonymized = FactAnonymizer::new(AnonymizeMode::Strict, Language::Es).anonymize_finding(&finding);
        assert!(anonymized.facts.is_empty());
        assert_eq!(anonymized.sign_anomaly_period.as_deref(), Some("YTD25"));
        assert_eq!(anonymized.priority_suggested, Priority::Alta);

        let json = serde_json::to_string(&anonymized).unwrap();
        assert!(!json.contains("20000"));
        assert!(!json.contains("5720001"));
        assert!(!json.contains("Bancos"));
    }

    #[test]
    fn test_schema_is_inlined() {
        let schema = AnonymizedFact::schema_as_json().unwrap();
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("definitions"));
        assert!(text.contains("variation_percentage"));
    }
}
