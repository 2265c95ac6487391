use crate::periods::{period_key, PeriodDetection, PeriodKind};
use crate::schema::{CellValue, RawBalanceRow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSource {
    /// Summed from monthly columns; the labels are in calendar order.
    Derived { labels: Vec<String> },
    /// Taken verbatim from an already-aggregated input column.
    Provided { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnAvailability {
    Available,
    /// The prior year lacks months needed for an aligned YTD window.
    Unavailable { missing_months: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    pub key: String,
    pub kind: PeriodKind,
    pub year: i32,
    /// Calendar months covered; `None` for provided columns.
    pub months: Option<Vec<u32>>,
    pub source: ColumnSource,
    pub availability: ColumnAvailability,
}

impl AggregateColumn {
    pub fn is_available(&self) -> bool {
        self.availability == ColumnAvailability::Available
    }
}

/// Which comparable buckets exist and which of them are compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationPlan {
    pub columns: BTreeMap<String, AggregateColumn>,
    pub comparison_pairs: Vec<(String, String)>,
    /// Aligned prior-year windows that could not be built.
    #[serde(default)]
    pub unavailable: Vec<AggregateColumn>,
}

impl AggregationPlan {
    pub fn from_detection(detection: &PeriodDetection) -> Self {
        let mut columns: BTreeMap<String, AggregateColumn> = BTreeMap::new();
        let mut unavailable = Vec::new();

        for plan in detection.years.values().filter(|p| p.is_complete) {
            let key = period_key(PeriodKind::FiscalYear, plan.year);
            columns.insert(
                key.clone(),
                AggregateColumn {
                    key,
                    kind: PeriodKind::FiscalYear,
                    year: plan.year,
                    months: Some(plan.month_numbers()),
                    source: ColumnSource::Derived {
                        labels: plan.months.iter().map(|m| m.label.clone()).collect(),
                    },
                    availability: ColumnAvailability::Available,
                },
            );
        }

        // Ascending order: an aligned window derived from year Y replaces the
        // own-months YTD of an incomplete Y-1.
        for plan in detection.years.values().filter(|p| !p.is_complete) {
            let months = plan.month_numbers();
            let key = period_key(PeriodKind::YearToDate, plan.year);
            columns.insert(
                key.clone(),
                AggregateColumn {
                    key,
                    kind: PeriodKind::YearToDate,
                    year: plan.year,
                    months: Some(months.clone()),
                    source: ColumnSource::Derived {
                        labels: plan.months.iter().map(|m| m.label.clone()).collect(),
                    },
                    availability: ColumnAvailability::Available,
                },
            );

            let Some(prior) = detection.plan(plan.year - 1) else {
                debug!("No prior year for YTD{}, no aligned comparison", plan.year);
                continue;
            };

            let prior_key = period_key(PeriodKind::YearToDate, prior.year);
            let missing_months: Vec<u32> = months
                .iter()
                .copied()
                .filter(|m| prior.label_for(*m).is_none())
                .collect();

            let (labels, availability) = if missing_months.is_empty() {
                let labels = months
                    .iter()
                    .filter_map(|m| prior.label_for(*m).map(str::to_string))
                    .collect();
                (labels, ColumnAvailability::Available)
            } else {
                debug!(
                    "{} unavailable: year {} lacks months {:?}",
                    prior_key, prior.year, missing_months
                );
                (Vec::new(), ColumnAvailability::Unavailable { missing_months })
            };

            let window = AggregateColumn {
                key: prior_key.clone(),
                kind: PeriodKind::YearToDate,
                year: prior.year,
                months: Some(months),
                source: ColumnSource::Derived { labels },
                availability,
            };
            // An unavailable window never displaces the prior year's own YTD.
            if window.is_available() {
                columns.insert(prior_key, window);
            } else {
                unavailable.push(window);
            }
        }

        for provided in &detection.aggregated_columns {
            let key = period_key(provided.kind, provided.year);
            if columns.contains_key(&key) {
                debug!(
                    "Ignoring provided column '{}': {} is derived from monthly data",
                    provided.label, key
                );
                continue;
            }
            columns.insert(
                key.clone(),
                AggregateColumn {
                    key,
                    kind: provided.kind,
                    year: provided.year,
                    months: None,
                    source: ColumnSource::Provided {
                        label: provided.label.clone(),
                    },
                    availability: ColumnAvailability::Available,
                },
            );
        }

        let comparison_pairs = Self::build_comparison_pairs(&columns);

        info!(
            "Aggregation plan: {} columns, {} comparison pairs",
            columns.len(),
            comparison_pairs.len()
        );

        Self {
            columns,
            comparison_pairs,
            unavailable,
        }
    }

    fn build_comparison_pairs(columns: &BTreeMap<String, AggregateColumn>) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        for kind in [PeriodKind::FiscalYear, PeriodKind::YearToDate] {
            let mut by_year: Vec<&AggregateColumn> = columns
                .values()
                .filter(|c| c.kind == kind && c.is_available())
                .collect();
            by_year.sort_by_key(|c| c.year);

            for window in by_year.windows(2) {
                let (prev, curr) = (window[0], window[1]);
                if curr.year != prev.year + 1 {
                    continue;
                }
                // YTD windows must cover the same calendar months to be comparable.
                if kind == PeriodKind::YearToDate && prev.months != curr.months {
                    continue;
                }
                pairs.push((prev.key.clone(), curr.key.clone()));
            }
        }

        pairs
    }

    /// Available keys in canonical display order: FY chronologically, then YTD.
    pub fn analysis_periods(&self) -> Vec<String> {
        let mut available: Vec<&AggregateColumn> =
            self.columns.values().filter(|c| c.is_available()).collect();
        available.sort_by_key(|c| (c.kind, c.year));
        available.into_iter().map(|c| c.key.clone()).collect()
    }

    /// Available keys, most recent first. A fiscal year ranks ahead of a YTD
    /// window of the same year.
    pub fn recent_periods(&self) -> Vec<String> {
        let mut available: Vec<&AggregateColumn> =
            self.columns.values().filter(|c| c.is_available()).collect();
        available.sort_by_key(|c| (std::cmp::Reverse(c.year), c.kind));
        available.into_iter().map(|c| c.key.clone()).collect()
    }

    pub fn unavailable_columns(&self) -> Vec<&AggregateColumn> {
        self.unavailable.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub account_code: String,
    pub description: String,
    /// Period key -> sum. `None` when a contributing cell was not applicable or not a number.
    pub values: BTreeMap<String, Option<f64>>,
}

impl AggregatedRow {
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }

    pub fn incomplete_periods(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Computable values only, for chart and analytics consumers.
    pub fn flat_values(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.map(|value| (k.clone(), value)))
            .collect()
    }
}

pub struct Aggregator<'a> {
    plan: &'a AggregationPlan,
}

impl<'a> Aggregator<'a> {
    pub fn new(plan: &'a AggregationPlan) -> Self {
        Self { plan }
    }

    pub fn aggregate_row(&self, row: &RawBalanceRow) -> AggregatedRow {
        let mut values = BTreeMap::new();

        for column in self.plan.columns.values().filter(|c| c.is_available()) {
            let value = match &column.source {
                ColumnSource::Derived { labels } => sum_cells(labels.iter().map(|l| row.cell(l))),
                ColumnSource::Provided { label } => sum_cells(std::iter::once(row.cell(label))),
            };
            if value.is_none() {
                debug!(
                    "Account {}: {} not computable (non-numeric or not-applicable cell)",
                    row.account_code, column.key
                );
            }
            values.insert(column.key.clone(), value);
        }

        AggregatedRow {
            account_code: row.account_code.clone(),
            description: row.description.clone(),
            values,
        }
    }

    pub fn aggregate(&self, rows: &[RawBalanceRow]) -> Vec<AggregatedRow> {
        rows.iter().map(|row| self.aggregate_row(row)).collect()
    }
}

fn sum_cells(cells: impl Iterator<Item = CellValue>) -> Option<f64> {
    let mut total = 0.0;
    for cell in cells {
        match cell {
            CellValue::Amount(v) if v.is_finite() => total += v,
            CellValue::Amount(_) | CellValue::NotApplicable => return None,
            CellValue::Missing => {}
        }
    }
    Some(total)
}
