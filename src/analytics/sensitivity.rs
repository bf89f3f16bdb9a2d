use crate::errors::{EngineError, EngineResult};
use crate::models::black_scholes::BlackScholes;
use crate::models::rate_curve::RateCurve;
use crate::state::{intrinsic_value, MarketState, OptionContract, PricingInputs};

/// Canonical maturity buckets (label, calendar days).
pub const MATURITY_BUCKETS: [(&str, u32); 6] = [
    ("Week", 7),
    ("Month", 31),
    ("Quarter", 124),
    ("Six Months", 185),
    ("Year", 365),
    ("5 years", 1825),
];

/// Input dimension varied by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    Spot,
    Volatility,
    Rate,
    Maturity,
}

impl std::str::FromStr for SweepAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "vol" | "volatility" => Ok(Self::Volatility),
            "rate" => Ok(Self::Rate),
            "maturity" | "days" => Ok(Self::Maturity),
            other => Err(format!("unknown sweep axis: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SweepPoint {
    /// Grid coordinate on the swept axis (spot, vol, rate or days)
    pub x: f64,
    /// Bucket name for maturity sweeps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<&'static str>,
    pub value: f64,
    /// Payoff if exercised at this point's spot
    pub intrinsic: f64,
}

/// Exact repricing against first- and second-order expansions in spot.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TaylorPoint {
    /// Relative spot shift
    pub shift: f64,
    pub spot: f64,
    pub exact: f64,
    pub first_order: f64,
    pub second_order: f64,
}

// ── Grids (endpoints inclusive, built from an integer count) ──

#[inline]
pub fn linear_grid(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

/// 0.05 ..= 0.80 step 0.05
pub fn volatility_grid() -> Vec<f64> {
    linear_grid(0.05, 0.05, 16)
}

/// 0 ..= 0.135 step 0.0025
pub fn rate_grid() -> Vec<f64> {
    linear_grid(0.0, 0.0025, 55)
}

/// 0.4 S ..= 1.6 S step 0.05 S
pub fn spot_grid(spot: f64) -> Vec<f64> {
    linear_grid(0.4, 0.05, 25).into_iter().map(|m| m * spot).collect()
}

/// -0.30 ..= 0.30 step 0.01
pub fn taylor_shifts() -> Vec<f64> {
    linear_grid(-0.30, 0.01, 61)
}

/// Batch re-evaluation of the pricing kernel along one input dimension.
///
/// The base contract and market are borrowed immutably; every grid point
/// prices a derived copy, so a sweep can never leak into later calls.
pub struct SensitivityEngine {
    kernel: BlackScholes,
}

impl SensitivityEngine {
    pub fn new() -> Self {
        Self {
            kernel: BlackScholes::new(),
        }
    }

    /// Sweep over the canonical grid for `axis`.
    ///
    /// With a curve, the maturity sweep re-reads the rate for each bucket.
    pub fn sweep(
        &self,
        contract: &OptionContract,
        market: &MarketState,
        axis: SweepAxis,
        curve: Option<&RateCurve>,
    ) -> EngineResult<Vec<SweepPoint>> {
        match axis {
            SweepAxis::Spot => {
                self.sweep_grid(contract, market, axis, &spot_grid(market.spot), None)
            }
            SweepAxis::Volatility => {
                self.sweep_grid(contract, market, axis, &volatility_grid(), None)
            }
            SweepAxis::Rate => self.sweep_grid(contract, market, axis, &rate_grid(), None),
            SweepAxis::Maturity => {
                let days: Vec<f64> = MATURITY_BUCKETS.iter().map(|&(_, d)| d as f64).collect();
                let mut points = self.sweep_grid(contract, market, axis, &days, curve)?;
                for (point, &(label, _)) in points.iter_mut().zip(MATURITY_BUCKETS.iter()) {
                    point.label = Some(label);
                }
                Ok(points)
            }
        }
    }

    /// Sweep over an explicit grid. Maturity coordinates are calendar days.
    pub fn sweep_grid(
        &self,
        contract: &OptionContract,
        market: &MarketState,
        axis: SweepAxis,
        grid: &[f64],
        curve: Option<&RateCurve>,
    ) -> EngineResult<Vec<SweepPoint>> {
        let base = PricingInputs::new(contract, market);
        let points = grid
            .iter()
            .map(|&x| {
                let inputs = Self::shifted(base, axis, x, curve)?;
                Ok(SweepPoint {
                    x,
                    label: None,
                    value: self.kernel.price(&inputs)?,
                    intrinsic: intrinsic_value(inputs.option_type, inputs.spot, inputs.strike),
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        tracing::debug!(?axis, points = points.len(), strike = contract.strike, "sweep complete");
        Ok(points)
    }

    fn shifted(
        base: PricingInputs,
        axis: SweepAxis,
        x: f64,
        curve: Option<&RateCurve>,
    ) -> EngineResult<PricingInputs> {
        Ok(match axis {
            SweepAxis::Spot => base.with_spot(x),
            SweepAxis::Volatility => base.with_volatility(x),
            SweepAxis::Rate => PricingInputs { rate: x, ..base },
            SweepAxis::Maturity => {
                let rate = match curve {
                    Some(c) => c.rate(x)?,
                    None => base.rate,
                };
                PricingInputs { rate, ..base.with_days(x) }
            }
        })
    }

    /// Compare exact repricing with Taylor expansions around the base spot.
    ///
    /// first  = V(S) + delta dS
    /// second = V(S) + delta dS + gamma dS^2 / 2,   dS = S x
    pub fn taylor_comparison(
        &self,
        contract: &OptionContract,
        market: &MarketState,
        shifts: &[f64],
    ) -> EngineResult<Vec<TaylorPoint>> {
        let base = PricingInputs::new(contract, market);
        let at_base = self.kernel.evaluate(&base, true)?;
        let greeks = at_base
            .greeks
            .ok_or_else(|| EngineError::Domain("greeks unavailable at base point".into()))?;

        shifts
            .iter()
            .map(|&x| {
                let ds = base.spot * x;
                let spot = base.spot + ds;
                let first_order = at_base.value + greeks.delta * ds;
                Ok(TaylorPoint {
                    shift: x,
                    spot,
                    exact: self.kernel.price(&base.with_spot(spot))?,
                    first_order,
                    second_order: first_order + 0.5 * greeks.gamma * ds * ds,
                })
            })
            .collect()
    }
}

impl Default for SensitivityEngine {
    fn default() -> Self {
        Self::new()
    }
}
