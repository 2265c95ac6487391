use crate::error::{BalanceAnalysisError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AccountType {
    #[schemars(description = "Revenue from sales of goods or services (Income Statement, credit balance)")]
    Revenue,

    #[schemars(description = "Purchases and direct costs of goods sold (Income Statement, debit balance)")]
    CostOfSales,

    #[schemars(
        description = "Operating expenses like personnel, external services, taxes and depreciation (Income Statement, debit balance)"
    )]
    OperatingExpense,

    #[schemars(description = "Financial and other non-operating income (Income Statement, credit balance)")]
    OtherIncome,

    #[schemars(
        description = "Resources owned by the company: fixed assets, inventory, receivables, cash (Balance Sheet, debit balance)"
    )]
    Asset,

    #[schemars(description = "Obligations owed to creditors: debt, suppliers, provisions (Balance Sheet, credit balance)")]
    Liability,

    #[schemars(description = "Owner's residual interest: share capital, reserves, retained earnings (Balance Sheet, credit balance)")]
    Equity,

    #[schemars(description = "Account whose nature cannot be derived from its code")]
    Unclassified,
}

impl AccountType {
    pub const ALL: [AccountType; 8] = [
        AccountType::Revenue,
        AccountType::CostOfSales,
        AccountType::OperatingExpense,
        AccountType::OtherIncome,
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Unclassified,
    ];

    /// Generic, non-identifying label for the account family.
    pub fn generic_label(&self, language: Language) -> &'static str {
        match (self, language) {
            (AccountType::Revenue, Language::En) => "income account",
            (AccountType::Revenue, _) => "cuenta de ingresos",
            (AccountType::CostOfSales, Language::En) => "cost of sales account",
            (AccountType::CostOfSales, _) => "cuenta de aprovisionamientos",
            (AccountType::OperatingExpense, Language::En) => "operating expense account",
            (AccountType::OperatingExpense, _) => "cuenta de gastos de explotación",
            (AccountType::OtherIncome, Language::En) => "other income account",
            (AccountType::OtherIncome, _) => "cuenta de otros ingresos",
            (AccountType::Asset, Language::En) => "asset account",
            (AccountType::Asset, _) => "cuenta de activo",
            (AccountType::Liability, Language::En) => "liability account",
            (AccountType::Liability, _) => "cuenta de pasivo",
            (AccountType::Equity, Language::En) => "equity account",
            (AccountType::Equity, _) => "cuenta de patrimonio neto",
            (AccountType::Unclassified, Language::En) => "general ledger account",
            (AccountType::Unclassified, _) => "cuenta contable",
        }
    }
}

/// Statement bucket a Q&A item is grouped under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum StatementCategory {
    #[serde(rename = "PL")]
    ProfitAndLoss,
    #[serde(rename = "BS")]
    BalanceSheet,
    Other,
}

impl StatementCategory {
    pub fn code(&self) -> &'static str {
        match self {
            StatementCategory::ProfitAndLoss => "PL",
            StatementCategory::BalanceSheet => "BS",
            StatementCategory::Other => "Other",
        }
    }
}

/// Declaration order is the report order: Alta sorts first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum Priority {
    Alta,
    Media,
    Baja,
}

impl Priority {
    pub fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (Priority::Alta, Language::En) => "High",
            (Priority::Media, Language::En) => "Medium",
            (Priority::Baja, Language::En) => "Low",
            (Priority::Alta, _) => "Alta",
            (Priority::Media, _) => "Media",
            (Priority::Baja, _) => "Baja",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
pub enum Status {
    #[default]
    Abierto,
    #[serde(rename = "En proceso")]
    EnProceso,
    Cerrado,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
    Both,
}

impl Language {
    pub fn wants_spanish(&self) -> bool {
        matches!(self, Language::Es | Language::Both)
    }

    pub fn wants_english(&self) -> bool {
        matches!(self, Language::En | Language::Both)
    }
}

/// How much of a finding may leave the process when an external generator is used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizeMode {
    /// Raw descriptions and amounts are handed to the generator.
    None,
    /// Generic category plus a coarse business label.
    Moderate,
    /// Generic category only.
    #[default]
    Strict,
}

/// Text carried in one or both report languages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
}

impl LocalizedText {
    pub fn build(language: Language, es: impl FnOnce() -> String, en: impl FnOnce() -> String) -> Self {
        Self {
            es: language.wants_spanish().then(es),
            en: language.wants_english().then(en),
        }
    }

    /// Spanish text when present, English otherwise.
    pub fn primary(&self) -> &str {
        self.es.as_deref().or(self.en.as_deref()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.es.is_none() && self.en.is_none()
    }
}

/// A single cell of the raw balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    Amount(f64),
    /// Blank cell: counts as zero when aggregating.
    Missing,
    /// Explicitly flagged as not applicable: poisons any bucket it falls in.
    NotApplicable,
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Amount(value)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Missing, CellValue::Amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBalanceRow {
    pub account_code: String,
    pub description: String,
    /// Column label -> cell. Labels absent from the map are treated as blank.
    #[serde(default)]
    pub values: BTreeMap<String, CellValue>,
}

impl RawBalanceRow {
    pub fn new(account_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            account_code: account_code.into(),
            description: description.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(label.into(), value.into());
        self
    }

    pub fn cell(&self, label: &str) -> CellValue {
        self.values.get(label).copied().unwrap_or(CellValue::Missing)
    }
}

/// A raw balance as handed over by the spreadsheet reader: ordered header plus rows.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BalanceTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawBalanceRow>,
}

impl BalanceTable {
    pub fn new(columns: Vec<String>, rows: Vec<RawBalanceRow>) -> Self {
        Self { columns, rows }
    }

    /// Builds the header from the rows themselves, in first-seen order.
    pub fn from_rows(rows: Vec<RawBalanceRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for label in row.values.keys() {
                if !columns.contains(label) {
                    columns.push(label.clone());
                }
            }
        }
        Self { columns, rows }
    }
}

fn default_threshold_pct() -> f64 {
    10.0
}

fn default_threshold_abs() -> f64 {
    50_000.0
}

fn default_min_value() -> f64 {
    100_000.0
}

fn default_trend_sensitivity() -> f64 {
    5.0
}

fn default_external_timeout_ms() -> u64 {
    30_000
}

pub fn default_asset_code_prefixes() -> Vec<String> {
    [
        "20", "21", "22", "23", "24", "25", "26", "27", "30", "31", "32", "33", "34", "35", "36",
        "43", "44", "470", "471", "472", "473", "474", "53", "54", "57",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Immutable analysis settings passed into every entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,

    #[serde(default = "default_threshold_abs")]
    pub threshold_abs: f64,

    #[serde(default = "default_min_value")]
    pub min_value: f64,

    #[serde(default)]
    pub focus_accounts: BTreeSet<String>,

    /// (base period key, compare period key), e.g. ("FY23", "FY24").
    #[serde(default)]
    pub focus_period_pairs: BTreeSet<(String, String)>,

    #[serde(default)]
    pub anonymize_mode: AnonymizeMode,

    #[serde(default)]
    pub language: Language,

    /// Percentage points by which |pct| must move between adjacent pairs to count
    /// as acceleration or deceleration.
    #[serde(default = "default_trend_sensitivity")]
    pub trend_sensitivity_pp: f64,

    #[serde(default = "default_asset_code_prefixes")]
    pub asset_code_prefixes: Vec<String>,

    #[serde(default = "default_external_timeout_ms")]
    pub external_timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_pct: default_threshold_pct(),
            threshold_abs: default_threshold_abs(),
            min_value: default_min_value(),
            focus_accounts: BTreeSet::new(),
            focus_period_pairs: BTreeSet::new(),
            anonymize_mode: AnonymizeMode::default(),
            language: Language::default(),
            trend_sensitivity_pp: default_trend_sensitivity(),
            asset_code_prefixes: default_asset_code_prefixes(),
            external_timeout_ms: default_external_timeout_ms(),
        }
    }
}

impl AnalysisConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }

    pub fn is_focus_account(&self, account_code: &str) -> bool {
        self.focus_accounts.contains(account_code)
    }

    pub fn is_focus_pair(&self, base: &str, compare: &str) -> bool {
        self.focus_period_pairs
            .iter()
            .any(|(b, c)| b == base && c == compare)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("threshold_pct", self.threshold_pct),
            ("threshold_abs", self.threshold_abs),
            ("min_value", self.min_value),
            ("trend_sensitivity_pp", self.trend_sensitivity_pp),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(BalanceAnalysisError::InvalidConfig(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, value
                )));
            }
        }

        if self.external_timeout_ms == 0 {
            return Err(BalanceAnalysisError::InvalidConfig(
                "external_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.asset_code_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(BalanceAnalysisError::InvalidConfig(
                "asset_code_prefixes cannot contain empty prefixes".to_string(),
            ));
        }

        Ok(())
    }
}

/// JSON schema for `T` with every subschema inlined and no `$schema` or
/// `definitions` keys, the shape structured-output APIs accept.
pub fn inline_json_schema<T: JsonSchema>() -> serde_json::Result<serde_json::Value> {
    let settings = schemars::gen::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.option_add_null_type = false;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("definitions");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_match_documented_fallbacks() {
        let config = AnalysisConfig::default();
        assert_eq!(config.threshold_pct, 10.0);
        assert_eq!(config.threshold_abs, 50_000.0);
        assert_eq!(config.min_value, 100_000.0);
        assert_eq!(config.anonymize_mode, AnonymizeMode::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json = r#"{
            "threshold_pct": 15.0,
            "focus_accounts": ["7000001"],
            "focus_period_pairs": [["FY23", "FY24"]],
            "anonymize_mode": "moderate",
            "language": "both"
        }"#;

        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.threshold_pct, 15.0);
        assert_eq!(config.threshold_abs, 50_000.0);
        assert!(config.is_focus_account("7000001"));
        assert!(config.is_focus_pair("FY23", "FY24"));
        assert!(!config.is_focus_pair("FY24", "FY23"));
        assert_eq!(config.anonymize_mode, AnonymizeMode::Moderate);
        assert_eq!(config.language, Language::Both);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = AnalysisConfig {
            threshold_abs: -1.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BalanceAnalysisError::InvalidConfig(_))
        ));

        let config = AnalysisConfig {
            threshold_pct: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_priority_order_puts_alta_first() {
        let mut priorities = vec![Priority::Baja, Priority::Alta, Priority::Media];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::Alta, Priority::Media, Priority::Baja]);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::EnProceso).unwrap();
        assert_eq!(json, "\"En proceso\"");
    }

    #[test]
    fn test_table_from_rows_collects_columns() {
        let rows = vec![
            RawBalanceRow::new("7000001", "Ventas").with_value("ene-24", 10.0),
            RawBalanceRow::new("6400000", "Sueldos")
                .with_value("ene-24", 5.0)
                .with_value("feb-24", CellValue::NotApplicable),
        ];
        let table = BalanceTable::from_rows(rows);
        assert_eq!(table.columns, vec!["ene-24".to_string(), "feb-24".to_string()]);
        assert_eq!(table.rows[0].cell("feb-24"), CellValue::Missing);
    }
}
