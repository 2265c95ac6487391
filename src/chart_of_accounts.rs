//! Spanish chart-of-accounts (PGC) conventions derived purely from account codes.
//!
//! Group 1 is basic financing, 2 fixed assets, 3 inventory, 4 creditors and
//! debtors, 5 financial accounts, 6 purchases and expenses, 7 sales and income.

use crate::schema::{AccountType, Language, StatementCategory};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub fn account_group(code: &str) -> Option<u32> {
    code.trim().chars().next().and_then(|c| c.to_digit(10))
}

pub fn statement_category(code: &str) -> StatementCategory {
    match account_group(code) {
        Some(6) | Some(7) => StatementCategory::ProfitAndLoss,
        Some(1..=5) => StatementCategory::BalanceSheet,
        _ => StatementCategory::Other,
    }
}

fn two_digit_prefix(code: &str) -> Option<u32> {
    let digits: String = code.trim().chars().take(2).collect();
    if digits.len() == 2 {
        digits.parse().ok()
    } else {
        None
    }
}

fn three_digit_prefix(code: &str) -> Option<u32> {
    let digits: String = code.trim().chars().take(3).collect();
    if digits.len() == 3 {
        digits.parse().ok()
    } else {
        None
    }
}

pub fn account_type_for_code(code: &str) -> AccountType {
    let Some(prefix) = two_digit_prefix(code) else {
        return AccountType::Unclassified;
    };

    match prefix {
        10..=13 => AccountType::Equity,
        14..=19 => AccountType::Liability,
        20..=39 => AccountType::Asset,
        40 | 41 => AccountType::Liability,
        43 | 44 => AccountType::Asset,
        46 => AccountType::Liability,
        47 => match three_digit_prefix(code) {
            Some(470..=474) => AccountType::Asset,
            Some(_) => AccountType::Liability,
            None => AccountType::Unclassified,
        },
        48 => match three_digit_prefix(code) {
            Some(480) => AccountType::Asset,
            Some(485) => AccountType::Liability,
            _ => AccountType::Unclassified,
        },
        49 => AccountType::Liability,
        50..=52 => AccountType::Liability,
        53 | 54 | 57 => AccountType::Asset,
        58 => AccountType::Asset,
        60 | 61 => AccountType::CostOfSales,
        62..=69 => AccountType::OperatingExpense,
        70..=75 => AccountType::Revenue,
        76..=79 => AccountType::OtherIncome,
        _ => AccountType::Unclassified,
    }
}

/// Whether the code falls in a configured asset range, where a negative
/// balance contradicts the account's natural sign.
pub fn is_asset_code(code: &str, asset_prefixes: &[String]) -> bool {
    let code = code.trim();
    asset_prefixes.iter().any(|prefix| code.starts_with(prefix.as_str()))
}

pub fn is_revenue_code(code: &str) -> bool {
    account_group(code) == Some(7)
}

/// Three-level business classification used by due-diligence reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IlvMapping {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl IlvMapping {
    fn new(level1: &str, level2: &str, level3: &str) -> Self {
        Self {
            level1: level1.to_string(),
            level2: level2.to_string(),
            level3: level3.to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} / {} / {}", self.level1, self.level2, self.level3)
    }
}

const ILV_TABLE: &[(&str, &str, &str, &str)] = &[
    ("10", "Balance", "Equity", "Share capital"),
    ("11", "Balance", "Equity", "Reserves"),
    ("12", "Balance", "Equity", "Retained earnings"),
    ("13", "Balance", "Equity", "Grants"),
    ("14", "Balance", "Liabilities", "Provisions"),
    ("15", "Balance", "Liabilities", "Long-term debt"),
    ("16", "Balance", "Liabilities", "Long-term debt"),
    ("17", "Balance", "Liabilities", "Long-term debt"),
    ("18", "Balance", "Liabilities", "Bonds"),
    ("19", "Balance", "Liabilities", "Provisions"),
    ("20", "Balance", "Assets", "Intangible assets"),
    ("21", "Balance", "Assets", "Tangible assets"),
    ("22", "Balance", "Assets", "Real estate investments"),
    ("23", "Balance", "Assets", "Fixed assets in progress"),
    ("24", "Balance", "Assets", "Financial assets"),
    ("25", "Balance", "Assets", "Long-term investments"),
    ("3", "Balance", "Working Capital", "Inventory"),
    ("40", "Balance", "Working Capital", "Trade payables"),
    ("41", "Balance", "Working Capital", "Trade payables"),
    ("43", "Balance", "Working Capital", "Trade receivables"),
    ("44", "Balance", "Working Capital", "Trade receivables"),
    ("46", "Balance", "Working Capital", "Personnel"),
    ("47", "Balance", "Working Capital", "Public entities"),
    ("48", "Balance", "Working Capital", "Accruals"),
    ("49", "Balance", "Working Capital", "Provisions"),
    ("50", "Balance", "Financial Position", "Short-term debt"),
    ("51", "Balance", "Financial Position", "Short-term debt"),
    ("52", "Balance", "Financial Position", "Short-term debt"),
    ("53", "Balance", "Financial Position", "Short-term investments"),
    ("54", "Balance", "Financial Position", "Short-term investments"),
    ("55", "Balance", "Financial Position", "Intercompany"),
    ("56", "Balance", "Financial Position", "Cash pending"),
    ("57", "Balance", "Financial Position", "Cash & equivalents"),
    ("60", "EBITDA", "COGS", "Purchases"),
    ("61", "EBITDA", "COGS", "Variation in stock"),
    ("62", "EBITDA", "OPEX", "External services"),
    ("63", "EBITDA", "OPEX", "Taxes"),
    ("64", "EBITDA", "OPEX", "Personnel costs"),
    ("65", "EBITDA", "OPEX", "Other operating expenses"),
    ("66", "EBITDA", "Financial expenses", "Financial expenses"),
    ("67", "EBITDA", "Extraordinary", "Extraordinary expenses"),
    ("68", "EBITDA", "D&A", "Depreciation & Amortization"),
    ("69", "EBITDA", "Provisions", "Provisions"),
    ("70", "EBITDA", "Revenue", "Gross revenue"),
    ("71", "EBITDA", "Revenue", "Other revenue"),
    ("72", "EBITDA", "Revenue", "Other revenue"),
    ("73", "EBITDA", "Revenue", "Other revenue"),
    ("74", "EBITDA", "Revenue", "Other revenue"),
    ("75", "EBITDA", "Revenue", "Other revenue"),
    ("76", "EBITDA", "Revenue", "Financial income"),
    ("77", "EBITDA", "Revenue", "Extraordinary income"),
];

/// Longest matching code prefix wins.
pub fn ilv_mapping(code: &str) -> Option<IlvMapping> {
    let code = code.trim();
    ILV_TABLE
        .iter()
        .filter(|(prefix, ..)| code.starts_with(prefix))
        .max_by_key(|(prefix, ..)| prefix.len())
        .map(|(_, l1, l2, l3)| IlvMapping::new(l1, l2, l3))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub code: String,
    pub description: String,
    pub account_type: AccountType,
    pub category: StatementCategory,
    pub ilv: Option<IlvMapping>,
}

impl AccountEntry {
    pub fn classify(code: &str, description: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            account_type: account_type_for_code(code),
            category: statement_category(code),
            ilv: ilv_mapping(code),
        }
    }
}

/// Accounts seen in an analysed balance, grouped by derived type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub sections: BTreeMap<AccountType, Vec<AccountEntry>>,
}

impl ChartOfAccounts {
    pub fn from_accounts<'a>(accounts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut sections: BTreeMap<AccountType, Vec<AccountEntry>> = BTreeMap::new();
        for (code, description) in accounts {
            let entry = AccountEntry::classify(code, description);
            sections.entry(entry.account_type).or_default().push(entry);
        }
        for entries in sections.values_mut() {
            entries.sort_by(|a, b| a.code.cmp(&b.code));
        }
        Self { sections }
    }

    pub fn total_accounts(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn accounts_of(&self, account_type: AccountType) -> &[AccountEntry] {
        self.sections
            .get(&account_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Code,Description,Account Type,Category,ILV\n");

        for entry in self.sections.values().flatten() {
            output.push_str(&format!(
                "{},\"{}\",{:?},{},{}\n",
                entry.code,
                entry.description.replace('"', "\"\""),
                entry.account_type,
                entry.category.code(),
                entry.ilv.as_ref().map(IlvMapping::label).unwrap_or_default()
            ));
        }

        output
    }

    pub fn to_markdown(&self, language: Language) -> String {
        let mut output = String::new();
        let title = if language == Language::En {
            "Chart of Accounts"
        } else {
            "Plan de cuentas"
        };
        output.push_str(&format!("# {}\n\n", title));

        for (account_type, entries) in &self.sections {
            output.push_str(&format!("## {}\n\n", account_type.generic_label(language)));
            for entry in entries {
                output.push_str(&format!("- {} {}\n", entry.code, entry.description));
            }
            output.push('\n');
        }

        output
    }
}
