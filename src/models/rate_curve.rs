use crate::errors::{EngineError, EngineResult};

/// Piecewise-linear zero curve keyed by days to maturity.
///
/// Rates are continuously compounded decimals. Queries outside
/// `[first_day, last_day]` are rejected, never extrapolated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateCurve {
    days: Vec<f64>,
    rates: Vec<f64>,
}

impl RateCurve {
    /// Build from `(days, rate)` pairs. Pairs are sorted by day; duplicate days are rejected.
    pub fn new(mut points: Vec<(f64, f64)>) -> EngineResult<Self> {
        if points.len() < 2 {
            return Err(EngineError::MissingData(format!(
                "rate curve needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(d, r)| !d.is_finite() || !r.is_finite()) {
            return Err(EngineError::Parse("rate curve contains non-finite values".into()));
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(EngineError::Parse("rate curve has duplicate maturities".into()));
        }

        let (days, rates) = points.into_iter().unzip();
        Ok(Self { days, rates })
    }

    /// Observed maturity range in days.
    pub fn domain(&self) -> (f64, f64) {
        (self.days[0], self.days[self.days.len() - 1])
    }

    /// Interpolated rate for an arbitrary days-to-expiry.
    pub fn rate(&self, days_to_expiry: f64) -> EngineResult<f64> {
        let (lo, hi) = self.domain();
        if !(days_to_expiry >= lo && days_to_expiry <= hi) {
            return Err(EngineError::OutOfRange(format!(
                "{days_to_expiry} days outside curve domain [{lo}, {hi}]"
            )));
        }

        // First knot strictly above the query; the query sits in [idx-1, idx].
        let idx = self.days.partition_point(|&d| d <= days_to_expiry);
        if idx == self.days.len() {
            return Ok(self.rates[idx - 1]);
        }

        let (x0, x1) = (self.days[idx - 1], self.days[idx]);
        let (y0, y1) = (self.rates[idx - 1], self.rates[idx]);
        let w = (days_to_expiry - x0) / (x1 - x0);
        Ok(y0 + w * (y1 - y0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> RateCurve {
        RateCurve::new(vec![(365.0, 0.010), (9.0, 0.002), (30.0, 0.004), (91.0, 0.006)]).unwrap()
    }

    #[test]
    fn test_knots_are_exact() {
        let c = curve();
        assert_eq!(c.rate(9.0).unwrap(), 0.002);
        assert_eq!(c.rate(30.0).unwrap(), 0.004);
        assert_eq!(c.rate(365.0).unwrap(), 0.010);
    }

    #[test]
    fn test_linear_between_knots() {
        let c = curve();
        let r = c.rate(60.5).unwrap();
        assert!((r - 0.005).abs() < 1e-15, "midpoint of 30..91 should be 0.005, got {r}");
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        assert_eq!(curve().domain(), (9.0, 365.0));
    }

    #[test]
    fn test_extrapolation_rejected() {
        let c = curve();
        assert!(matches!(c.rate(8.9), Err(EngineError::OutOfRange(_))));
        assert!(matches!(c.rate(366.0), Err(EngineError::OutOfRange(_))));
        assert!(matches!(c.rate(f64::NAN), Err(EngineError::OutOfRange(_))));
    }

    #[test]
    fn test_construction_errors() {
        assert!(RateCurve::new(vec![(30.0, 0.01)]).is_err());
        assert!(RateCurve::new(vec![(30.0, 0.01), (30.0, 0.02)]).is_err());
        assert!(RateCurve::new(vec![(30.0, f64::NAN), (60.0, 0.02)]).is_err());
    }
}
