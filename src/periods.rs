//! Classification of raw balance columns into calendar months and fiscal years.
//!
//! Every year is assumed to run January to December. A year with all twelve
//! months is complete and is later summed into an `FY` column; anything less is
//! incomplete and only feeds `YTD` columns.

use crate::error::{BalanceAnalysisError, Result};
use chrono::{Datelike, Month, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

const SPANISH_MONTHS: [(&str, u32); 26] = [
    ("enero", 1),
    ("ene", 1),
    ("febrero", 2),
    ("feb", 2),
    ("marzo", 3),
    ("mar", 3),
    ("abril", 4),
    ("abr", 4),
    ("mayo", 5),
    ("may", 5),
    ("junio", 6),
    ("jun", 6),
    ("julio", 7),
    ("jul", 7),
    ("agosto", 8),
    ("ago", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("sep", 9),
    ("set", 9),
    ("octubre", 10),
    ("oct", 10),
    ("noviembre", 11),
    ("nov", 11),
    ("diciembre", 12),
    ("dic", 12),
];

const LABEL_SEPARATORS: [char; 5] = [' ', '-', '/', '.', '_'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    FiscalYear,
    YearToDate,
}

impl PeriodKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            PeriodKind::FiscalYear => "FY",
            PeriodKind::YearToDate => "YTD",
        }
    }
}

/// Canonical key of an aggregated column: `FY23`, `YTD25`.
pub fn period_key(kind: PeriodKind, year: i32) -> String {
    format!("{}{:02}", kind.prefix(), year.rem_euclid(100))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodColumn {
    Monthly { year: i32, month: u32 },
    Aggregated { kind: PeriodKind, year: i32 },
}

impl PeriodColumn {
    /// Recognizes `<month> <year>` (Spanish or English names, full or
    /// abbreviated), ISO `YYYY-MM`, and pre-aggregated `FY23` / `YTD24` labels.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        parse_aggregated(label)
            .or_else(|| parse_iso_month(label))
            .or_else(|| parse_named_month(label))
    }
}

fn parse_year_token(token: &str) -> Option<i32> {
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match token.len() {
        2 => token.parse::<i32>().ok().map(|yy| 2000 + yy),
        4 => token.parse::<i32>().ok(),
        _ => None,
    }
}

fn parse_aggregated(label: &str) -> Option<PeriodColumn> {
    let upper = label.to_ascii_uppercase();
    let (kind, rest) = if let Some(rest) = upper.strip_prefix("YTD") {
        (PeriodKind::YearToDate, rest)
    } else if let Some(rest) = upper.strip_prefix("FY") {
        (PeriodKind::FiscalYear, rest)
    } else {
        return None;
    };

    let year = parse_year_token(rest.trim_start_matches(LABEL_SEPARATORS))?;
    Some(PeriodColumn::Aggregated { kind, year })
}

fn parse_iso_month(label: &str) -> Option<PeriodColumn> {
    let (year_part, month_part) = label.split_once('-')?;
    if year_part.len() != 4 || month_part.is_empty() || month_part.len() > 2 {
        return None;
    }

    let date = NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d").ok()?;
    Some(PeriodColumn::Monthly {
        year: date.year(),
        month: date.month(),
    })
}

fn month_from_name(token: &str) -> Option<u32> {
    let lower = token.to_lowercase();
    if let Some((_, number)) = SPANISH_MONTHS.iter().find(|(name, _)| *name == lower) {
        return Some(*number);
    }
    if lower == "sept" {
        return Some(9);
    }
    Month::from_str(&lower)
        .ok()
        .map(|month| month.number_from_month())
}

fn parse_named_month(label: &str) -> Option<PeriodColumn> {
    let tokens: Vec<&str> = label
        .split(LABEL_SEPARATORS)
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.as_slice() {
        [month_token, year_token] => {
            let month = month_from_name(month_token)?;
            let year = parse_year_token(year_token)?;
            Some(PeriodColumn::Monthly { year, month })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthColumn {
    pub month: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalYearPlan {
    pub year: i32,
    /// Calendar-ordered, one entry per distinct month present.
    pub months: Vec<MonthColumn>,
    pub is_complete: bool,
}

impl FiscalYearPlan {
    pub fn month_numbers(&self) -> Vec<u32> {
        self.months.iter().map(|m| m.month).collect()
    }

    pub fn label_for(&self, month: u32) -> Option<&str> {
        self.months
            .iter()
            .find(|m| m.month == month)
            .map(|m| m.label.as_str())
    }

    pub fn has_months(&self, months: &[u32]) -> bool {
        months.iter().all(|m| self.label_for(*m).is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedColumn {
    pub label: String,
    pub kind: PeriodKind,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousYear {
    pub year: i32,
    pub month: u32,
    pub labels: Vec<String>,
}

impl AmbiguousYear {
    pub fn to_error(&self) -> BalanceAnalysisError {
        BalanceAnalysisError::AmbiguousPeriod {
            year: self.year,
            month: self.month,
            labels: self.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodDetection {
    /// Unambiguous years only, chronologically.
    pub years: BTreeMap<i32, FiscalYearPlan>,
    pub aggregated_columns: Vec<AggregatedColumn>,
    pub dropped_columns: Vec<String>,
    pub ambiguous: Vec<AmbiguousYear>,
    pub warnings: Vec<String>,
}

impl PeriodDetection {
    pub fn complete_years(&self) -> Vec<i32> {
        self.years
            .values()
            .filter(|plan| plan.is_complete)
            .map(|plan| plan.year)
            .collect()
    }

    pub fn incomplete_years(&self) -> Vec<i32> {
        self.years
            .values()
            .filter(|plan| !plan.is_complete)
            .map(|plan| plan.year)
            .collect()
    }

    pub fn plan(&self, year: i32) -> Option<&FiscalYearPlan> {
        self.years.get(&year)
    }
}

/// Lenient detection: unknown labels and ambiguous years are reported as
/// warnings and left out of the plan.
pub fn detect_periods(labels: &[String]) -> PeriodDetection {
    let mut detection = PeriodDetection::default();
    let mut by_year: BTreeMap<i32, BTreeMap<u32, Vec<String>>> = BTreeMap::new();

    for label in labels {
        match PeriodColumn::parse(label) {
            Some(PeriodColumn::Monthly { year, month }) => {
                by_year
                    .entry(year)
                    .or_default()
                    .entry(month)
                    .or_default()
                    .push(label.clone());
            }
            Some(PeriodColumn::Aggregated { kind, year }) => {
                debug!("Column '{}' is already aggregated ({:?} {})", label, kind, year);
                detection.aggregated_columns.push(AggregatedColumn {
                    label: label.clone(),
                    kind,
                    year,
                });
            }
            None => {
                let err = BalanceAnalysisError::ColumnFormat {
                    label: label.clone(),
                };
                warn!("{}", err);
                detection.warnings.push(err.to_string());
                detection.dropped_columns.push(label.clone());
            }
        }
    }

    for (year, months) in by_year {
        let duplicates: Vec<AmbiguousYear> = months
            .iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(month, labels)| AmbiguousYear {
                year,
                month: *month,
                labels: labels.clone(),
            })
            .collect();

        if !duplicates.is_empty() {
            for ambiguous in &duplicates {
                let err = ambiguous.to_error();
                warn!("{}; year {} is excluded from aggregation", err, year);
                detection.warnings.push(err.to_string());
            }
            detection.ambiguous.extend(duplicates);
            continue;
        }

        let month_columns: Vec<MonthColumn> = months
            .into_iter()
            .map(|(month, mut labels)| MonthColumn {
                month,
                label: labels.remove(0),
            })
            .collect();

        let is_complete = month_columns.len() == 12;
        detection.years.insert(
            year,
            FiscalYearPlan {
                year,
                months: month_columns,
                is_complete,
            },
        );
    }

    info!(
        "Detected {} complete and {} incomplete fiscal years ({} columns dropped)",
        detection.complete_years().len(),
        detection.incomplete_years().len(),
        detection.dropped_columns.len()
    );

    detection
}

/// Same as [`detect_periods`] but surfaces the first duplicated month as an error.
pub fn detect_periods_strict(labels: &[String]) -> Result<PeriodDetection> {
    let detection = detect_periods(labels);
    match detection.ambiguous.first() {
        Some(ambiguous) => Err(ambiguous.to_error()),
        None => Ok(detection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn full_year(prefix_year: &str) -> Vec<String> {
        ["ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic"]
            .iter()
            .map(|m| format!("{}-{}", m, prefix_year))
            .collect()
    }

    #[test]
    fn test_parse_label_formats() {
        assert_eq!(
            PeriodColumn::parse("Enero 2024"),
            Some(PeriodColumn::Monthly { year: 2024, month: 1 })
        );
        assert_eq!(
            PeriodColumn::parse("ago-25"),
            Some(PeriodColumn::Monthly { year: 2025, month: 8 })
        );
        assert_eq!(
            PeriodColumn::parse("Jan-21"),
            Some(PeriodColumn::Monthly { year: 2021, month: 1 })
        );
        assert_eq!(
            PeriodColumn::parse("December 2023"),
            Some(PeriodColumn::Monthly { year: 2023, month: 12 })
        );
        assert_eq!(
            PeriodColumn::parse("2024-03"),
            Some(PeriodColumn::Monthly { year: 2024, month: 3 })
        );
        assert_eq!(
            PeriodColumn::parse("FY23"),
            Some(PeriodColumn::Aggregated {
                kind: PeriodKind::FiscalYear,
                year: 2023
            })
        );
        assert_eq!(
            PeriodColumn::parse("ytd25"),
            Some(PeriodColumn::Aggregated {
                kind: PeriodKind::YearToDate,
                year: 2025
            })
        );
    }

    #[test]
    fn test_unrecognized_labels() {
        assert_eq!(PeriodColumn::parse("Descripción"), None);
        assert_eq!(PeriodColumn::parse("2024-13"), None);
        assert_eq!(PeriodColumn::parse("Foo 2024"), None);
        assert_eq!(PeriodColumn::parse(""), None);
    }

    #[test]
    fn test_period_key_format() {
        assert_eq!(period_key(PeriodKind::FiscalYear, 2023), "FY23");
        assert_eq!(period_key(PeriodKind::YearToDate, 2005), "YTD05");
    }

    #[test]
    fn test_complete_and_incomplete_years() {
        let mut cols = full_year("24");
        cols.extend(labels(&["ene-25", "feb-25", "mar-25"]));

        let detection = detect_periods(&cols);
        assert_eq!(detection.complete_years(), vec![2024]);
        assert_eq!(detection.incomplete_years(), vec![2025]);
        assert!(detection.plan(2024).unwrap().is_complete);
        assert_eq!(detection.plan(2025).unwrap().month_numbers(), vec![1, 2, 3]);
    }

    #[test]
    fn test_months_sorted_calendar_wise() {
        let detection = detect_periods(&labels(&["mar-24", "ene-24", "feb-24"]));
        let plan = detection.plan(2024).unwrap();
        assert_eq!(plan.month_numbers(), vec![1, 2, 3]);
        assert_eq!(plan.label_for(1), Some("ene-24"));
    }

    #[test]
    fn test_unknown_columns_dropped_with_warning() {
        let detection = detect_periods(&labels(&["Saldo", "ene-24"]));
        assert_eq!(detection.dropped_columns, vec!["Saldo".to_string()]);
        assert_eq!(detection.warnings.len(), 1);
        assert_eq!(detection.years.len(), 1);
    }

    #[test]
    fn test_duplicate_month_is_ambiguous() {
        let cols = labels(&["ene-24", "2024-01", "feb-24", "ene-25"]);

        let detection = detect_periods(&cols);
        assert!(detection.plan(2024).is_none());
        assert!(detection.plan(2025).is_some());
        assert_eq!(detection.ambiguous.len(), 1);

        let strict = detect_periods_strict(&cols);
        assert!(matches!(
            strict,
            Err(BalanceAnalysisError::AmbiguousPeriod {
                year: 2024,
                month: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_aggregated_columns_recorded() {
        let detection = detect_periods(&labels(&["FY22", "ene-23"]));
        assert_eq!(detection.aggregated_columns.len(), 1);
        assert_eq!(detection.aggregated_columns[0].year, 2022);
        assert!(detection.warnings.is_empty());
    }
}
