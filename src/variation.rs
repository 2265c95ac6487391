use crate::aggregation::AggregatedRow;
use crate::error::{BalanceAnalysisError, Result};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Percentage reported for a zero base. Display only; the
/// `NewAccount`/`DisappearedAccount` tags carry the meaning.
pub const NEW_ACCOUNT_SENTINEL_PCT: f64 = 100.0;

/// Change in revenue share, in percentage points, worth stating in the reason.
pub const REVENUE_SHARE_PP_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VariationTag {
    NewAccount,
    DisappearedAccount,
    SignAnomaly,
    TrendReversal,
    Acceleration,
    Deceleration,
    Forced,
}

impl VariationTag {
    pub fn is_new_or_disappeared(&self) -> bool {
        matches!(self, VariationTag::NewAccount | VariationTag::DisappearedAccount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationResult {
    pub account_code: String,
    pub base_period: String,
    pub compare_period: String,
    pub value_base: f64,
    pub value_compare: f64,
    pub variation_abs: f64,
    pub variation_pct: f64,
    pub tags: BTreeSet<VariationTag>,
}

impl VariationResult {
    pub fn has_tag(&self, tag: VariationTag) -> bool {
        self.tags.contains(&tag)
    }

    /// True when `variation_pct` is the ±100 zero-base sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.has_tag(VariationTag::NewAccount)
    }

    pub fn is_new_or_disappeared(&self) -> bool {
        self.tags.iter().any(VariationTag::is_new_or_disappeared)
    }

    pub fn max_abs_value(&self) -> f64 {
        self.value_base.abs().max(self.value_compare.abs())
    }

    /// Percentage points gained or lost as a share of revenue between the two
    /// periods. `None` when either period has no revenue.
    pub fn revenue_share_pp(&self, revenue_totals: &BTreeMap<String, f64>) -> Option<f64> {
        let share = |period: &str, value: f64| {
            revenue_totals
                .get(period)
                .filter(|total| **total > 0.0)
                .map(|total| value.abs() / total * 100.0)
        };
        let base = share(&self.base_period, self.value_base)?;
        let compare = share(&self.compare_period, self.value_compare)?;
        Some(compare - base)
    }
}

/// Raw delta between two period values: `(variation_abs, variation_pct, tags)`.
/// Returns `None` if either operand is absent or not finite.
pub fn compute_delta(base: Option<f64>, compare: Option<f64>) -> Option<(f64, f64, BTreeSet<VariationTag>)> {
    let base = base.filter(|v| v.is_finite())?;
    let compare = compare.filter(|v| v.is_finite())?;

    let mut tags = BTreeSet::new();
    let variation_abs = compare - base;

    let variation_pct = if base == 0.0 && compare == 0.0 {
        0.0
    } else if base == 0.0 {
        tags.insert(VariationTag::NewAccount);
        if compare > 0.0 {
            NEW_ACCOUNT_SENTINEL_PCT
        } else {
            -NEW_ACCOUNT_SENTINEL_PCT
        }
    } else {
        if compare == 0.0 {
            tags.insert(VariationTag::DisappearedAccount);
        }
        variation_abs / base.abs() * 100.0
    };

    Some((variation_abs, variation_pct, tags))
}

pub struct VariationCalculator {
    trend_sensitivity_pp: f64,
}

impl VariationCalculator {
    pub fn new(trend_sensitivity_pp: f64) -> Self {
        Self { trend_sensitivity_pp }
    }

    pub fn calculate(&self, row: &AggregatedRow, base: &str, compare: &str) -> Result<VariationResult> {
        let not_computable = || BalanceAnalysisError::NotComputableVariation {
            account: row.account_code.clone(),
            base: base.to_string(),
            compare: compare.to_string(),
        };

        let value_base = row.value(base);
        let value_compare = row.value(compare);
        let (variation_abs, variation_pct, tags) =
            compute_delta(value_base, value_compare).ok_or_else(not_computable)?;

        Ok(VariationResult {
            account_code: row.account_code.clone(),
            base_period: base.to_string(),
            compare_period: compare.to_string(),
            value_base: value_base.unwrap_or_default(),
            value_compare: value_compare.unwrap_or_default(),
            variation_abs,
            variation_pct,
            tags,
        })
    }

    /// All computable pairs of one account, in pair order, with trend tags
    /// assigned from adjacent pairs. Non-computable pairs are skipped and
    /// reported in the second tuple element.
    pub fn calculate_account(
        &self,
        row: &AggregatedRow,
        pairs: &[(String, String)],
    ) -> (Vec<VariationResult>, Vec<BalanceAnalysisError>) {
        let mut results = Vec::with_capacity(pairs.len());
        let mut skipped = Vec::new();

        for (base, compare) in pairs {
            match self.calculate(row, base, compare) {
                Ok(result) => results.push(result),
                Err(err) => {
                    debug!("{}", err);
                    skipped.push(err);
                }
            }
        }

        self.assign_trend_tags(&mut results);
        (results, skipped)
    }

    /// Second pass: compares each pair with the previous one of the same
    /// series and tags the more recent pair. FY and YTD pairs are separate
    /// series.
    pub fn assign_trend_tags(&self, results: &mut [VariationResult]) {
        for i in 1..results.len() {
            let (earlier, later) = results.split_at_mut(i);
            let prior = &earlier[i - 1];
            let current = &mut later[0];

            if prior.compare_period != current.base_period {
                continue;
            }

            if prior.variation_pct != 0.0
                && current.variation_pct != 0.0
                && prior.variation_pct.signum() != current.variation_pct.signum()
            {
                current.tags.insert(VariationTag::TrendReversal);
            }

            if prior.is_sentinel() || current.is_sentinel() {
                continue;
            }

            let delta = current.variation_pct.abs() - prior.variation_pct.abs();
            if delta > self.trend_sensitivity_pp {
                current.tags.insert(VariationTag::Acceleration);
            } else if delta < -self.trend_sensitivity_pp {
                current.tags.insert(VariationTag::Deceleration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(values: &[(&str, Option<f64>)]) -> AggregatedRow {
        AggregatedRow {
            account_code: "6400000".to_string(),
            description: "Sueldos y salarios".to_string(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn pairs(keys: &[&str]) -> Vec<(String, String)> {
        keys.windows(2)
            .map(|w| (w[0].to_string(), w[1].to_string()))
            .collect()
    }

    #[test]
    fn test_revenue_share_change_in_points() {
        let (variation_abs, variation_pct, tags) = compute_delta(Some(100_000.0), Some(150_000.0)).unwrap();
        let result = VariationResult {
            account_code: "6400000".to_string(),
            base_period: "FY23".to_string(),
            compare_period: "FY24".to_string(),
            value_base: 100_000.0,
            value_compare: 150_000.0,
            variation_abs,
            variation_pct,
            tags,
        };

        let totals = BTreeMap::from([
            ("FY23".to_string(), 1_000_000.0),
            ("FY24".to_string(), 1_250_000.0),
        ]);
        // 10% -> 12% of revenue
        let pp = result.revenue_share_pp(&totals).unwrap();
        assert!((pp - 2.0).abs() < 1e-9);

        let no_revenue = BTreeMap::from([("FY24".to_string(), 1_250_000.0)]);
        assert_eq!(result.revenue_share_pp(&no_revenue), None);
    }

    #[test]
    fn test_basic_percentage() {
        let (abs, pct, tags) = compute_delta(Some(100_000.0), Some(150_000.0)).unwrap();
        assert_eq!(abs, 50_000.0);
        assert!((pct - 50.0).abs() < 1e-9);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_sign_follows_direction_for_negative_base() {
        for (base, compare) in [(-100.0, -50.0), (-100.0, 0.5), (-1.0, -0.999), (-5_000.0, 20_000.0)] {
            let (_, pct, _) = compute_delta(Some(base), Some(compare)).unwrap();
            assert!(pct > 0.0, "{} -> {} gave {}", base, compare, pct);
        }
        let (_, pct, _) = compute_delta(Some(-100.0), Some(-150.0)).unwrap();
        assert!((pct + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_base_sentinels() {
        let (abs, pct, tags) = compute_delta(Some(0.0), Some(80_000.0)).unwrap();
        assert_eq!(abs, 80_000.0);
        assert_eq!(pct, 100.0);
        assert!(tags.contains(&VariationTag::NewAccount));

        let (_, pct, _) = compute_delta(Some(0.0), Some(-1.0)).unwrap();
        assert_eq!(pct, -100.0);

        let (_, pct, tags) = compute_delta(Some(0.0), Some(0.0)).unwrap();
        assert_eq!(pct, 0.0);
        assert!(tags.is_empty());

        let (_, pct, tags) = compute_delta(Some(500.0), Some(0.0)).unwrap();
        assert_eq!(pct, -100.0);
        assert!(tags.contains(&VariationTag::DisappearedAccount));
    }

    #[test]
    fn test_absent_or_nan_is_not_computable() {
        assert!(compute_delta(None, Some(1.0)).is_none());
        assert!(compute_delta(Some(f64::NAN), Some(1.0)).is_none());
        assert!(compute_delta(Some(1.0), Some(f64::INFINITY)).is_none());

        let calculator = VariationCalculator::new(5.0);
        let r = row(&[("FY23", Some(1.0)), ("FY24", None)]);
        let err = calculator.calculate(&r, "FY23", "FY24").unwrap_err();
        assert!(matches!(err, BalanceAnalysisError::NotComputableVariation { .. }));

        let (results, skipped) = calculator.calculate_account(&r, &pairs(&["FY23", "FY24"]));
        assert!(results.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn test_trend_reversal_tags_more_recent_pair() {
        let calculator = VariationCalculator::new(5.0);
        let r = row(&[
            ("FY22", Some(100.0)),
            ("FY23", Some(150.0)),
            ("FY24", Some(120.0)),
        ]);
        let (results, _) = calculator.calculate_account(&r, &pairs(&["FY22", "FY23", "FY24"]));
        assert_eq!(results.len(), 2);
        assert!(!results[0].has_tag(VariationTag::TrendReversal));
        assert!(results[1].has_tag(VariationTag::TrendReversal));
    }

    #[test]
    fn test_acceleration_and_deceleration() {
        let calculator = VariationCalculator::new(5.0);

        // +10% then +50%
        let accelerating = row(&[("FY22", Some(100.0)), ("FY23", Some(110.0)), ("FY24", Some(165.0))]);
        let (results, _) = calculator.calculate_account(&accelerating, &pairs(&["FY22", "FY23", "FY24"]));
        assert!(results[1].has_tag(VariationTag::Acceleration));

        // +50% then +10%
        let decelerating = row(&[("FY22", Some(100.0)), ("FY23", Some(150.0)), ("FY24", Some(165.0))]);
        let (results, _) = calculator.calculate_account(&decelerating, &pairs(&["FY22", "FY23", "FY24"]));
        assert!(results[1].has_tag(VariationTag::Deceleration));

        // +10% then +12%: inside the margin
        let steady = row(&[("FY22", Some(100.0)), ("FY23", Some(110.0)), ("FY24", Some(123.2))]);
        let (results, _) = calculator.calculate_account(&steady, &pairs(&["FY22", "FY23", "FY24"]));
        assert!(!results[1].has_tag(VariationTag::Acceleration));
        assert!(!results[1].has_tag(VariationTag::Deceleration));
    }

    #[test]
    fn test_sentinel_pairs_do_not_drive_acceleration() {
        let calculator = VariationCalculator::new(5.0);
        let r = row(&[("FY22", Some(0.0)), ("FY23", Some(100.0)), ("FY24", Some(300.0))]);
        let (results, _) = calculator.calculate_account(&r, &pairs(&["FY22", "FY23", "FY24"]));
        assert!(results[0].has_tag(VariationTag::NewAccount));
        assert!(!results[1].has_tag(VariationTag::Acceleration));
    }

    #[test]
    fn test_unrelated_series_not_compared() {
        let calculator = VariationCalculator::new(5.0);
        let r = row(&[
            ("FY23", Some(100.0)),
            ("FY24", Some(200.0)),
            ("YTD24", Some(100.0)),
            ("YTD25", Some(50.0)),
        ]);
        let pairs = vec![
            ("FY23".to_string(), "FY24".to_string()),
            ("YTD24".to_string(), "YTD25".to_string()),
        ];
        let (results, _) = calculator.calculate_account(&r, &pairs);
        assert!(!results[1].has_tag(VariationTag::TrendReversal));
    }
}
