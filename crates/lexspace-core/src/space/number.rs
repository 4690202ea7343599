use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use super::NumberTarget;
use crate::error::{Error, Result};

/// Default query behaviour of a number space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberMode {
    /// Monotonic: higher values score higher.
    #[default]
    Maximum,
    /// Values close to a query-time target score higher. Queries that do
    /// not supply a target fall back to [`NumberMode::Maximum`].
    Similar,
}

/// Angle encoding of a bounded scalar.
///
/// A value clamped to `[min, max]` is scaled to `x ∈ [0, 1]` and mapped to
/// the unit vector `[cos(x·π/2), sin(x·π/2)]`. The dot product with the
/// maximum vector `[0, 1]` is `sin(x·π/2)`, which is monotonic in `x`; the
/// dot product with an encoded target is the cosine of the angle between
/// the two, peaking at the target.
#[derive(Debug, Clone)]
pub struct NumberSpace {
    name: String,
    field: String,
    min: f64,
    max: f64,
    mode: NumberMode,
}

impl NumberSpace {
    pub const DIMS: usize = 2;

    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        min: f64,
        max: f64,
        mode: NumberMode,
    ) -> Result<Self> {
        let name = name.into();
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::IndexConfig(format!(
                "number space '{}': bounds must be finite with min < max, got [{}, {}]",
                name, min, max
            )));
        }
        Ok(Self {
            name,
            field: field.into(),
            min,
            max,
            mode,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn mode(&self) -> NumberMode {
        self.mode
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn embed(&self, value: f64) -> Vec<f32> {
        let clamped = if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        };
        let x = (clamped - self.min) / (self.max - self.min);
        let angle = x * FRAC_PI_2;
        vec![angle.cos() as f32, angle.sin() as f32]
    }

    pub fn query_vector(&self, target: NumberTarget) -> Vec<f32> {
        match target {
            NumberTarget::Maximum => vec![0.0, 1.0],
            NumberTarget::Similar(value) => self.embed(value),
        }
    }

    /// Resolve the query target from an optional caller-supplied value.
    ///
    /// An explicit target always wins. Without one a `Similar` space falls
    /// back to `Maximum`.
    pub fn resolve_target(&self, target: Option<f64>) -> NumberTarget {
        match (target, self.mode) {
            (Some(value), _) => NumberTarget::Similar(value),
            (None, NumberMode::Maximum) => NumberTarget::Maximum,
            (None, NumberMode::Similar) => {
                tracing::warn!(
                    space = %self.name,
                    "no target supplied for similar-mode number space, falling back to maximum"
                );
                NumberTarget::Maximum
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::dot;

    fn authority(mode: NumberMode) -> NumberSpace {
        NumberSpace::new("authority", "authority_score", 0.0, 1.0, mode).unwrap()
    }

    #[test]
    fn test_maximum_is_monotonic() {
        let s = authority(NumberMode::Maximum);
        let q = s.query_vector(NumberTarget::Maximum);
        let scores: Vec<f32> = [0.0, 0.25, 0.5, 0.9, 1.0]
            .iter()
            .map(|v| dot(&q, &s.embed(*v)))
            .collect();
        assert!(scores.windows(2).all(|w| w[0] < w[1]));
        assert!(scores[0].abs() < 1e-6);
        assert!((scores[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similar_peaks_at_target() {
        let s = authority(NumberMode::Similar);
        let q = s.query_vector(NumberTarget::Similar(0.4));
        let at = dot(&q, &s.embed(0.4));
        let near = dot(&q, &s.embed(0.5));
        let far = dot(&q, &s.embed(1.0));
        assert!((at - 1.0).abs() < 1e-6);
        assert!(at > near && near > far);
    }

    #[test]
    fn test_values_are_clamped() {
        let s = authority(NumberMode::Maximum);
        assert_eq!(s.embed(7.0), s.embed(1.0));
        assert_eq!(s.embed(-3.0), s.embed(0.0));
    }

    #[test]
    fn test_similar_without_target_falls_back_to_maximum() {
        assert_eq!(authority(NumberMode::Similar).resolve_target(None), NumberTarget::Maximum);
        assert_eq!(
            authority(NumberMode::Maximum).resolve_target(Some(0.3)),
            NumberTarget::Similar(0.3)
        );
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(NumberSpace::new("n", "f", 1.0, 1.0, NumberMode::Maximum).is_err());
        assert!(NumberSpace::new("n", "f", 0.0, f64::INFINITY, NumberMode::Maximum).is_err());
    }
}
