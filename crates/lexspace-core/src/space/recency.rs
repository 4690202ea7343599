use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// A recency window and its relative weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub seconds: i64,
    pub weight: f32,
}

impl Period {
    /// Fails with [`Error::IndexConfig`] when the window does not fit in
    /// `i64` seconds.
    pub fn days(days: i64, weight: f32) -> Result<Self> {
        let seconds = days.checked_mul(SECONDS_PER_DAY).ok_or_else(|| {
            Error::IndexConfig(format!("recency period of {} days is out of range", days))
        })?;
        Ok(Self { seconds, weight })
    }
}

/// Multi-window linear decay relative to a fixed reference time.
///
/// For `age = max(0, reference_time - ts)` component `i` is
/// `wᵢ/Σw · max(0, 1 - age/periodᵢ)`. A final floor component is set to
/// `negative_filter` once `age` exceeds the longest period. The query
/// vector is all ones, so the score is the sum of the components: `1.0`
/// for brand-new entities, decaying to `0.0` at the edge of the longest
/// window, and exactly `negative_filter` beyond it, however old.
#[derive(Debug, Clone)]
pub struct RecencySpace {
    name: String,
    field: String,
    reference_time: i64,
    periods: Vec<Period>,
    total_weight: f32,
    negative_filter: f32,
}

impl RecencySpace {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        reference_time: i64,
        periods: Vec<Period>,
        negative_filter: f32,
    ) -> Result<Self> {
        let name = name.into();
        if periods.is_empty() {
            return Err(Error::IndexConfig(format!(
                "recency space '{}' needs at least one period",
                name
            )));
        }
        if let Some(p) = periods
            .iter()
            .find(|p| p.seconds <= 0 || !p.weight.is_finite() || p.weight < 0.0)
        {
            return Err(Error::IndexConfig(format!(
                "recency space '{}': invalid period {:?}",
                name, p
            )));
        }
        let total_weight: f32 = periods.iter().map(|p| p.weight).sum();
        if total_weight <= 0.0 {
            return Err(Error::IndexConfig(format!(
                "recency space '{}': period weights must not all be zero",
                name
            )));
        }
        if !negative_filter.is_finite() || negative_filter > 0.0 {
            return Err(Error::IndexConfig(format!(
                "recency space '{}': negative_filter must be finite and <= 0, got {}",
                name, negative_filter
            )));
        }
        let mut periods = periods;
        periods.sort_by_key(|p| p.seconds);
        Ok(Self {
            name,
            field: field.into(),
            reference_time,
            periods,
            total_weight,
            negative_filter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn reference_time(&self) -> i64 {
        self.reference_time
    }

    pub fn negative_filter(&self) -> f32 {
        self.negative_filter
    }

    /// One component per period plus the floor component.
    pub fn dims(&self) -> usize {
        self.periods.len() + 1
    }

    fn longest(&self) -> i64 {
        self.periods.last().map(|p| p.seconds).unwrap_or(0)
    }

    pub fn embed(&self, timestamp: i64) -> Vec<f32> {
        let age = self.reference_time.saturating_sub(timestamp).max(0);
        let mut v = vec![0.0f32; self.dims()];
        if age > self.longest() {
            v[self.periods.len()] = self.negative_filter;
            return v;
        }
        for (slot, period) in v.iter_mut().zip(&self.periods) {
            let decay = (1.0 - age as f64 / period.seconds as f64).max(0.0) as f32;
            *slot = period.weight / self.total_weight * decay;
        }
        v
    }

    pub fn query_vector(&self) -> Vec<f32> {
        vec![1.0; self.dims()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::dot;

    const NOW: i64 = 1_750_000_000;

    fn space() -> RecencySpace {
        RecencySpace::new(
            "recency",
            "recency_timestamp",
            NOW,
            vec![Period::days(365, 0.5).unwrap(), Period::days(30, 1.0).unwrap()],
            -0.5,
        )
        .unwrap()
    }

    fn score(s: &RecencySpace, days_old: i64) -> f32 {
        dot(&s.query_vector(), &s.embed(NOW - days_old * SECONDS_PER_DAY))
    }

    #[test]
    fn test_fresh_scores_one() {
        let s = space();
        assert!((score(&s, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decays_with_age() {
        let s = space();
        let scores: Vec<f32> = [0, 10, 29, 100, 364].iter().map(|d| score(&s, *d)).collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]));
        assert!(scores.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn test_short_window_weighs_more() {
        let s = space();
        // Within 30 days both windows contribute; after it only the yearly one does.
        assert!(score(&s, 15) > 2.0 * score(&s, 45));
    }

    #[test]
    fn test_out_of_window_pinned_to_floor() {
        let s = space();
        let just_out = score(&s, 366);
        let ancient = score(&s, 365 * 40);
        assert_eq!(just_out, -0.5);
        assert_eq!(ancient, -0.5);
        assert!(score(&s, 364) > just_out);
    }

    #[test]
    fn test_future_timestamps_count_as_fresh() {
        let s = space();
        assert!((score(&s, -10) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_config_errors() {
        assert!(RecencySpace::new("r", "f", NOW, vec![], -0.5).is_err());
        assert!(RecencySpace::new("r", "f", NOW, vec![Period::days(0, 1.0).unwrap()], -0.5).is_err());
        assert!(RecencySpace::new("r", "f", NOW, vec![Period::days(30, 0.0).unwrap()], -0.5).is_err());
        assert!(RecencySpace::new("r", "f", NOW, vec![Period::days(30, 1.0).unwrap()], 0.5).is_err());
    }

    #[test]
    fn test_period_overflow_is_config_error() {
        assert_eq!(Period::days(7, 1.0).unwrap().seconds, 7 * SECONDS_PER_DAY);
        let err = Period::days(i64::MAX / SECONDS_PER_DAY + 1, 1.0).unwrap_err();
        assert!(matches!(err, Error::IndexConfig(_)));
        assert!(Period::days(i64::MIN, 1.0).is_err());
    }
}
