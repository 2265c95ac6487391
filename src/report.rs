use crate::aggregation::AggregatedRow;
use crate::chart_of_accounts::{ilv_mapping, statement_category, ChartOfAccounts, IlvMapping};
use crate::checklist::{standard_checklist, ChecklistItem, CHECKLIST_VERSION};
use crate::error::Result;
use crate::schema::{AccountType, Language, LocalizedText, Priority, StatementCategory, Status};
use crate::synthesis::{AccountFinding, GeneratedBy, SynthesizedText};
use crate::utils::{format_count, format_pct};
use crate::variation::VariationTag;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationSummary {
    pub base_period: String,
    pub compare_period: String,
    pub value_base: f64,
    pub value_compare: f64,
    pub variation_abs: f64,
    /// ±100 for a zero base is a display marker; see `tags`.
    pub variation_pct: f64,
    pub priority: Priority,
    pub tags: BTreeSet<VariationTag>,
    /// Change in the account's share of revenue, in percentage points.
    #[serde(default)]
    pub pp_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    pub account_code: String,
    pub description: String,
    pub category: StatementCategory,
    pub account_type: AccountType,
    pub ilv: Option<IlvMapping>,
    pub priority: Priority,
    pub status: Status,
    pub question: LocalizedText,
    pub reason: LocalizedText,
    pub values: BTreeMap<String, f64>,
    pub variations: Vec<VariationSummary>,
    pub tags: BTreeSet<VariationTag>,
    pub forced: bool,
    /// Period keys whose value could not be computed for this account.
    pub incomplete_periods: Vec<String>,
    pub percentage_over_revenue: BTreeMap<String, f64>,
    pub generated_by: GeneratedBy,
    pub response: Option<String>,
    pub follow_up: Option<String>,
}

impl QaItem {
    pub fn from_finding(
        finding: &AccountFinding,
        row: &AggregatedRow,
        text: SynthesizedText,
        revenue_totals: &BTreeMap<String, f64>,
    ) -> Self {
        let values = row.flat_values();
        let percentage_over_revenue = values
            .iter()
            .filter_map(|(period, value)| {
                revenue_totals
                    .get(period)
                    .filter(|total| **total > 0.0)
                    .map(|total| (period.clone(), value.abs() / total * 100.0))
            })
            .collect();

        let variations = finding
            .variations
            .iter()
            .map(|c| VariationSummary {
                base_period: c.variation.base_period.clone(),
                compare_period: c.variation.compare_period.clone(),
                value_base: c.variation.value_base,
                value_compare: c.variation.value_compare,
                variation_abs: c.variation.variation_abs,
                variation_pct: c.variation.variation_pct,
                priority: c.priority,
                tags: c.variation.tags.clone(),
                pp_change: c.revenue_share_pp,
            })
            .collect();

        Self {
            account_code: finding.account_code.clone(),
            description: finding.description.clone(),
            category: statement_category(&finding.account_code),
            account_type: finding.account_type,
            ilv: ilv_mapping(&finding.account_code),
            priority: finding.priority(),
            status: Status::default(),
            question: text.question,
            reason: text.reason,
            values,
            variations,
            tags: finding.tags(),
            forced: finding.variations.iter().any(|c| c.is_forced()),
            incomplete_periods: row.incomplete_periods(),
            percentage_over_revenue,
            generated_by: text.generated_by,
            response: None,
            follow_up: None,
        }
    }

    /// Pair with the largest absolute change.
    fn headline_variation(&self) -> Option<&VariationSummary> {
        self.variations
            .iter()
            .max_by(|a, b| a.variation_abs.abs().total_cmp(&b.variation_abs.abs()))
    }
}

/// Changes made by the external audit workflow, keyed by account code or
/// checklist id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditUpdate {
    pub key: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
}

/// Everything the assembler needs besides the items.
#[derive(Debug, Clone, Default)]
pub struct ReportData {
    pub analysis_periods: Vec<String>,
    pub comparison_pairs: Vec<(String, String)>,
    pub period_values: BTreeMap<String, BTreeMap<String, f64>>,
    pub revenue_totals: BTreeMap<String, f64>,
    pub accounts: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReport {
    pub language: Language,
    pub items: Vec<QaItem>,
    pub checklist: Vec<ChecklistItem>,
    pub checklist_version: String,
    pub analysis_periods: Vec<String>,
    pub comparison_pairs: Vec<(String, String)>,
    /// Account code -> period key -> value, for chart consumers.
    pub period_values: BTreeMap<String, BTreeMap<String, f64>>,
    pub revenue_totals: BTreeMap<String, f64>,
    pub chart_of_accounts: ChartOfAccounts,
    pub warnings: Vec<String>,
}

pub struct ReportAssembler {
    language: Language,
}

impl ReportAssembler {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Orders items by category, then Alta/Media/Baja, then account code, and
    /// attaches the standard checklist.
    pub fn assemble(&self, mut items: Vec<QaItem>, data: ReportData) -> QaReport {
        items.sort_by(|a, b| {
            (a.category, a.priority, &a.account_code).cmp(&(b.category, b.priority, &b.account_code))
        });

        let chart_of_accounts =
            ChartOfAccounts::from_accounts(data.accounts.iter().map(|(c, d)| (c.as_str(), d.as_str())));

        let report = QaReport {
            language: self.language,
            items,
            checklist: standard_checklist(self.language),
            checklist_version: CHECKLIST_VERSION.to_string(),
            analysis_periods: data.analysis_periods,
            comparison_pairs: data.comparison_pairs,
            period_values: data.period_values,
            revenue_totals: data.revenue_totals,
            chart_of_accounts,
            warnings: data.warnings,
        };

        let counts = report.count_by_priority();
        info!(
            "Report assembled: {} items (Alta {}, Media {}, Baja {}), {} checklist topics",
            report.items.len(),
            counts.get(&Priority::Alta).copied().unwrap_or(0),
            counts.get(&Priority::Media).copied().unwrap_or(0),
            counts.get(&Priority::Baja).copied().unwrap_or(0),
            report.checklist.len()
        );

        report
    }
}

impl QaReport {
    pub fn by_category(&self) -> BTreeMap<StatementCategory, Vec<&QaItem>> {
        let mut grouped: BTreeMap<StatementCategory, Vec<&QaItem>> = BTreeMap::new();
        for item in &self.items {
            grouped.entry(item.category).or_default().push(item);
        }
        grouped
    }

    pub fn count_by_priority(&self) -> BTreeMap<Priority, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.priority).or_insert(0) += 1;
        }
        counts
    }

    pub fn item(&self, account_code: &str) -> Option<&QaItem> {
        self.items.iter().find(|i| i.account_code == account_code)
    }

    /// Items with the largest absolute change, highest priority first on ties.
    pub fn top_items(&self, n: usize) -> Vec<&QaItem> {
        let mut ranked: Vec<&QaItem> = self.items.iter().collect();
        ranked.sort_by(|a, b| {
            let magnitude = |item: &QaItem| item.headline_variation().map(|v| v.variation_abs.abs()).unwrap_or(0.0);
            magnitude(b)
                .total_cmp(&magnitude(a))
                .then(a.priority.cmp(&b.priority))
                .then(a.account_code.cmp(&b.account_code))
        });
        ranked.truncate(n);
        ranked
    }

    pub fn executive_summary(&self) -> LocalizedText {
        LocalizedText::build(
            self.language,
            || self.render_summary(Language::Es),
            || self.render_summary(Language::En),
        )
    }

    fn render_summary(&self, language: Language) -> String {
        let english = language == Language::En;
        let counts = self.count_by_priority();
        let count = |p: Priority| format_count(counts.get(&p).copied().unwrap_or(0), language);
        let range = match (self.analysis_periods.first(), self.analysis_periods.last()) {
            (Some(first), Some(last)) => format!("{} - {}", first, last),
            _ => "-".to_string(),
        };

        let mut lines = if english {
            vec![
                "# Executive Summary - Financial Due Diligence".to_string(),
                String::new(),
                format!("**Periods analysed:** {}", range),
                String::new(),
                "## Key Findings".to_string(),
                format!("- Variations reported: {}", format_count(self.items.len(), language)),
                format!("- High priority: {}", count(Priority::Alta)),
                format!("- Medium priority: {}", count(Priority::Media)),
                format!("- Low priority: {}", count(Priority::Baja)),
                String::new(),
            ]
        } else {
            vec![
                "# Resumen Ejecutivo - Due Diligence Financiero".to_string(),
                String::new(),
                format!("**Periodo analizado:** {}", range),
                String::new(),
                "## Hallazgos Principales".to_string(),
                format!("- Variaciones reportadas: {}", format_count(self.items.len(), language)),
                format!("- Prioridad alta: {}", count(Priority::Alta)),
                format!("- Prioridad media: {}", count(Priority::Media)),
                format!("- Prioridad baja: {}", count(Priority::Baja)),
                String::new(),
            ]
        };

        let top = self.top_items(5);
        if !top.is_empty() {
            lines.push(if english { "## Top Variations" } else { "## Top Variaciones" }.to_string());
            for item in top {
                let pct = item
                    .headline_variation()
                    .map(|v| {
                        if v.tags.contains(&VariationTag::NewAccount) {
                            if english { "new".to_string() } else { "nueva".to_string() }
                        } else {
                            format_pct(v.variation_pct)
                        }
                    })
                    .unwrap_or_else(|| "N/A".to_string());
                lines.push(format!(
                    "- **{}**: {} ({}: {})",
                    item.description,
                    pct,
                    if english { "Priority" } else { "Prioridad" },
                    item.priority.label(language)
                ));
            }
            lines.push(String::new());
        }

        if english {
            lines.extend([
                "## Recommendations".to_string(),
                "1. Review high-priority variations with management".to_string(),
                "2. Request supporting documents for every finding".to_string(),
                "3. Check answers for consistency".to_string(),
            ]);
        } else {
            lines.extend([
                "## Recomendaciones".to_string(),
                "1. Revisar las variaciones de alta prioridad con la dirección".to_string(),
                "2. Solicitar documentación soporte para cada hallazgo".to_string(),
                "3. Verificar consistencia de respuestas".to_string(),
            ]);
        }

        lines.join("\n")
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// New report with workflow fields merged in. Updates whose key matches no
    /// item or checklist topic are ignored; `self` is left untouched.
    pub fn with_audit_updates(&self, updates: &[AuditUpdate]) -> QaReport {
        let mut updated = self.clone();

        for update in updates {
            if let Some(item) = updated.items.iter_mut().find(|i| i.account_code == update.key) {
                if let Some(status) = update.status {
                    item.status = status;
                }
                if update.response.is_some() {
                    item.response = update.response.clone();
                }
                if update.follow_up.is_some() {
                    item.follow_up = update.follow_up.clone();
                }
            } else if let Some(topic) = updated.checklist.iter_mut().find(|c| c.id == update.key) {
                if let Some(status) = update.status {
                    topic.status = status;
                }
            }
        }

        updated
    }
}
