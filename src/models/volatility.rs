use crate::errors::{EngineError, EngineResult};

/// Trading days per year for return-based statistics
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Minimum returns before a GARCH fit is attempted
const MIN_OBSERVATIONS: usize = 30;

/// Coarse grid for (alpha, beta), in hundredths
const ALPHA_GRID: std::ops::RangeInclusive<u32> = 1..=30;
const BETA_GRID: std::ops::RangeInclusive<u32> = 50..=98;

/// Refinement half-width (in steps of 0.001) around the best coarse cell
const REFINE_STEPS: i32 = 10;

/// Stationarity margin: alpha + beta must stay below this
const MAX_PERSISTENCE: f64 = 0.999;

/// Source of an annualized volatility forecast, quoted in percent.
pub trait VolatilityForecaster: Send + Sync {
    fn name(&self) -> &'static str;

    /// Annualized volatility (percent) expected over the next `horizon_days` trading days.
    fn forecast_vol_pct(&self, horizon_days: usize) -> EngineResult<f64>;
}

/// A fixed volatility level, e.g. the VIX close on the valuation date.
#[derive(Debug, Clone, Copy)]
pub struct FixedForecast(pub f64);

impl VolatilityForecaster for FixedForecast {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn forecast_vol_pct(&self, _horizon_days: usize) -> EngineResult<f64> {
        Ok(self.0)
    }
}

/// Constant-mean GARCH(1,1) with Gaussian innovations, fitted on percent log returns.
///
/// sigma^2_{t+1} = omega + alpha * eps_t^2 + beta * sigma^2_t
///
/// omega is pinned by variance targeting: omega = s^2 (1 - alpha - beta).
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Garch11 {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Sample (= long-run) variance of the residuals
    pub long_run_variance: f64,
    /// One-step-ahead variance after the last observation
    pub next_variance: f64,
    pub log_likelihood: f64,
    pub observations: usize,
    /// sqrt(252/n * sum h_t) over the fitted conditional variances, percent
    pub in_sample_vol_pct: f64,
}

impl Garch11 {
    /// Maximum-likelihood fit over a coarse-then-fine (alpha, beta) grid.
    pub fn fit(returns_pct: &[f64]) -> EngineResult<Self> {
        if returns_pct.len() < MIN_OBSERVATIONS {
            return Err(EngineError::Forecast(format!(
                "need at least {MIN_OBSERVATIONS} returns, got {}",
                returns_pct.len()
            )));
        }
        if returns_pct.iter().any(|r| !r.is_finite()) {
            return Err(EngineError::Forecast("returns contain non-finite values".into()));
        }

        let n = returns_pct.len() as f64;
        let mu = returns_pct.iter().sum::<f64>() / n;
        let residuals: Vec<f64> = returns_pct.iter().map(|r| r - mu).collect();
        let s2 = residuals.iter().map(|e| e * e).sum::<f64>() / n;
        if s2 <= 1e-16 {
            return Err(EngineError::Forecast("returns have zero variance".into()));
        }

        // (log-likelihood, alpha, beta, next variance)
        let mut best: Option<(f64, f64, f64, f64)> = None;
        let consider = |best: &mut Option<(f64, f64, f64, f64)>, alpha: f64, beta: f64| {
            if alpha <= 0.0 || beta < 0.0 || alpha + beta >= MAX_PERSISTENCE {
                return;
            }
            let (ll, next) = log_likelihood(&residuals, s2, alpha, beta);
            if ll.is_finite() && best.map_or(true, |(b, ..)| ll > b) {
                *best = Some((ll, alpha, beta, next));
            }
        };

        for a in ALPHA_GRID {
            for b in BETA_GRID {
                consider(&mut best, a as f64 * 0.01, b as f64 * 0.01);
            }
        }

        let (_, a0, b0, _) = best.ok_or_else(no_admissible_fit)?;
        for i in -REFINE_STEPS..=REFINE_STEPS {
            for j in -REFINE_STEPS..=REFINE_STEPS {
                consider(&mut best, a0 + i as f64 * 0.001, b0 + j as f64 * 0.001);
            }
        }

        let (log_likelihood, alpha, beta, next_variance) = best.ok_or_else(no_admissible_fit)?;
        let in_sample: f64 = conditional_variances(&residuals, s2, alpha, beta).iter().sum();

        let fitted = Self {
            mu,
            omega: s2 * (1.0 - alpha - beta),
            alpha,
            beta,
            long_run_variance: s2,
            next_variance,
            log_likelihood,
            observations: returns_pct.len(),
            in_sample_vol_pct: (TRADING_DAYS_PER_YEAR / n * in_sample).sqrt(),
        };
        tracing::info!(
            alpha = fitted.alpha,
            beta = fitted.beta,
            omega = fitted.omega,
            mu = fitted.mu,
            observations = fitted.observations,
            in_sample_vol_pct = fitted.in_sample_vol_pct,
            "GARCH(1,1) fitted"
        );
        Ok(fitted)
    }

    #[inline]
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Daily variance forecasts for steps 1..=horizon (percent^2).
    pub fn forecast_variances(&self, horizon: usize) -> Vec<f64> {
        let p = self.persistence();
        let gap = self.next_variance - self.long_run_variance;
        let mut decay = 1.0;
        (0..horizon)
            .map(|_| {
                let v = self.long_run_variance + decay * gap;
                decay *= p;
                v
            })
            .collect()
    }
}

impl VolatilityForecaster for Garch11 {
    fn name(&self) -> &'static str {
        "GARCH(1,1)"
    }

    fn forecast_vol_pct(&self, horizon_days: usize) -> EngineResult<f64> {
        if horizon_days == 0 {
            return Err(EngineError::Forecast("forecast horizon must be positive".into()));
        }
        let total: f64 = self.forecast_variances(horizon_days).iter().sum();
        Ok((TRADING_DAYS_PER_YEAR / horizon_days as f64 * total).sqrt())
    }
}

/// Gaussian log-likelihood and the variance one step past the sample.
fn log_likelihood(residuals: &[f64], s2: f64, alpha: f64, beta: f64) -> (f64, f64) {
    let omega = s2 * (1.0 - alpha - beta);
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();
    let mut h = s2;
    let mut ll = 0.0;
    for &e in residuals {
        ll -= 0.5 * (ln_2pi + h.ln() + e * e / h);
        h = omega + alpha * e * e + beta * h;
    }
    (ll, h)
}

/// Conditional variance h_t for every observation, seeded at the sample variance.
fn conditional_variances(residuals: &[f64], s2: f64, alpha: f64, beta: f64) -> Vec<f64> {
    let omega = s2 * (1.0 - alpha - beta);
    let mut h = s2;
    residuals
        .iter()
        .map(|&e| {
            let current = h;
            h = omega + alpha * e * e + beta * h;
            current
        })
        .collect()
}

fn no_admissible_fit() -> EngineError {
    EngineError::Forecast("no admissible GARCH parameters".into())
}

/// Percent log returns, 100 * ln(p_t / p_{t-1}).
pub fn log_returns_pct(prices: &[f64]) -> EngineResult<Vec<f64>> {
    if prices.iter().any(|p| !(*p > 0.0 && p.is_finite())) {
        return Err(EngineError::Domain("prices must be positive and finite".into()));
    }
    Ok(prices.windows(2).map(|w| 100.0 * (w[1] / w[0]).ln()).collect())
}

/// Realized volatility over a price window: sqrt(252/n * sum r^2), percent.
pub fn annualized_realized_vol_pct(prices: &[f64]) -> EngineResult<f64> {
    let returns = log_returns_pct(prices)?;
    if returns.is_empty() {
        return Err(EngineError::MissingData(
            "realized volatility needs at least two prices".into(),
        ));
    }
    let sum_sq: f64 = returns.iter().map(|r| r * r).sum();
    Ok((TRADING_DAYS_PER_YEAR / returns.len() as f64 * sum_sq).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn simulate(alpha: f64, beta: f64, omega: f64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut h = omega / (1.0 - alpha - beta);
        (0..n)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                let e = h.sqrt() * z;
                h = omega + alpha * e * e + beta * h;
                0.02 + e
            })
            .collect()
    }

    #[test]
    fn test_recovers_simulated_parameters() {
        let returns = simulate(0.10, 0.85, 0.05, 4000);
        let g = Garch11::fit(&returns).unwrap();
        assert!(g.alpha > 0.05 && g.alpha < 0.20, "alpha={}", g.alpha);
        assert!(g.beta > 0.75 && g.beta < 0.92, "beta={}", g.beta);
        assert!(g.persistence() > 0.88 && g.persistence() < MAX_PERSISTENCE);
        assert!((g.omega - g.long_run_variance * (1.0 - g.persistence())).abs() < 1e-12);

        // unconditional vol is sqrt(252 * 0.05 / 0.05) = sqrt(252)
        let target = 252f64.sqrt();
        assert!(
            (g.in_sample_vol_pct - target).abs() < 0.2 * target,
            "in-sample vol {}",
            g.in_sample_vol_pct
        );
    }

    #[test]
    fn test_constant_magnitude_returns() {
        // eps^2 == s^2 every day, so the variance path is flat at 1 whatever the parameters.
        let returns: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let g = Garch11::fit(&returns).unwrap();
        assert!((g.next_variance - 1.0).abs() < 1e-9);
        let vol = g.forecast_vol_pct(22).unwrap();
        assert!((vol - 252f64.sqrt()).abs() < 1e-6, "vol={vol}");
        assert!((g.in_sample_vol_pct - 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_reverts_to_long_run() {
        let g = Garch11 {
            mu: 0.0,
            omega: 0.1,
            alpha: 0.1,
            beta: 0.8,
            long_run_variance: 1.0,
            next_variance: 4.0,
            log_likelihood: 0.0,
            observations: 100,
            in_sample_vol_pct: 15.0,
        };
        let v = g.forecast_variances(200);
        assert_eq!(v[0], 4.0);
        assert!((v[1] - (1.0 + 0.9 * 3.0)).abs() < 1e-12);
        assert!(v.windows(2).all(|w| w[1] < w[0]));
        assert!((v[199] - 1.0).abs() < 1e-6);
        let short = g.forecast_vol_pct(5).unwrap();
        let long = g.forecast_vol_pct(200).unwrap();
        assert!(short > long, "elevated start should decay: {short} vs {long}");
        assert!(g.forecast_vol_pct(0).is_err());
    }

    #[test]
    fn test_fit_rejects_short_or_flat_samples() {
        assert!(matches!(Garch11::fit(&[0.1; 10]), Err(EngineError::Forecast(_))));
        assert!(matches!(Garch11::fit(&[0.5; 50]), Err(EngineError::Forecast(_))));
        let mut r = vec![0.1; 50];
        r[3] = f64::NAN;
        assert!(Garch11::fit(&r).is_err());
    }

    #[test]
    fn test_realized_vol() {
        // Alternating +-1% moves: each |r| = 100 ln(1.01) or 100 ln(1/1.01)
        let mut prices = vec![100.0];
        for i in 0..20 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last * 1.01 } else { last / 1.01 });
        }
        let r = 100.0 * 1.01f64.ln();
        let expected = (252.0 * r * r).sqrt();
        let vol = annualized_realized_vol_pct(&prices).unwrap();
        assert!((vol - expected).abs() < 1e-9, "vol={vol} expected={expected}");
        assert!(annualized_realized_vol_pct(&[100.0]).is_err());
        assert!(log_returns_pct(&[100.0, 0.0]).is_err());
    }

    #[test]
    fn test_fixed_forecast() {
        let f = FixedForecast(13.8);
        assert_eq!(f.forecast_vol_pct(22).unwrap(), 13.8);
        assert_eq!(f.name(), "fixed");
    }
}
