use crate::errors::{EngineError, EngineResult};
use crate::hedge::report::{HedgeDay, HedgeReport};
use crate::models::black_scholes::BlackScholes;
use crate::models::volatility::VolatilityForecaster;
use crate::state::{OptionContract, OptionType, PricingInputs, DAYS_PER_YEAR};

#[derive(Debug, Clone, Copy)]
pub struct HedgeConfig {
    /// Proportional cost on every stock trade and, once, on the option premium
    pub transaction_cost_rate: f64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            transaction_cost_rate: 0.0005,
        }
    }
}

/// Where the hedge's (constant) volatility comes from.
pub enum VolatilitySource<'a> {
    /// Annualized decimal volatility, e.g. the listed implied vol
    Implied(f64),
    /// Queried once for the whole path; the percent result is divided by 100
    Forecast {
        forecaster: &'a dyn VolatilityForecaster,
        horizon_days: usize,
    },
}

impl VolatilitySource<'_> {
    fn resolve(&self) -> EngineResult<f64> {
        let vol = match self {
            Self::Implied(v) => *v,
            Self::Forecast {
                forecaster,
                horizon_days,
            } => {
                let pct = forecaster.forecast_vol_pct(*horizon_days)?;
                tracing::info!(
                    forecaster = forecaster.name(),
                    horizon_days,
                    vol_pct = pct,
                    "hedge volatility from forecast"
                );
                pct / 100.0
            }
        };
        if !(vol > 0.0 && vol.is_finite()) {
            return Err(EngineError::Domain(format!("hedge volatility must be positive: {vol}")));
        }
        Ok(vol)
    }
}

/// Daily delta hedge of a written European option.
///
/// Day 0 sells the option for `premium` and buys `delta_0` shares; each later
/// day rebalances to the new delta and accrues interest on the bank account.
/// The final day liquidates the stock and pays the option's payoff.
pub struct DeltaHedgeSimulator {
    kernel: BlackScholes,
    config: HedgeConfig,
}

impl DeltaHedgeSimulator {
    pub fn new(config: HedgeConfig) -> Self {
        Self {
            kernel: BlackScholes::new(),
            config,
        }
    }

    /// Run over `path`, whose first `N + 1` entries are the spots for days `0..=N`
    /// (`N = contract.days_to_expiry`). Any gap aborts the whole simulation.
    pub fn run(
        &self,
        contract: &OptionContract,
        rate: f64,
        dividend: f64,
        premium: f64,
        volatility: VolatilitySource<'_>,
        path: &[f64],
    ) -> EngineResult<HedgeReport> {
        let n = contract.days_to_expiry;
        let steps = n as usize + 1;
        if path.len() < steps {
            return Err(EngineError::MissingData(format!(
                "hedge needs {steps} daily spots, path has {}",
                path.len()
            )));
        }
        if let Some((day, s)) = path[..steps]
            .iter()
            .enumerate()
            .find(|(_, s)| !(**s > 0.0 && s.is_finite()))
        {
            return Err(EngineError::MissingData(format!("no usable spot for day {day}: {s}")));
        }
        if !premium.is_finite() || !rate.is_finite() {
            return Err(EngineError::Domain("premium and rate must be finite".into()));
        }

        let vol = volatility.resolve()?;
        let tc = self.config.transaction_cost_rate;
        let mut days = Vec::with_capacity(steps);

        let mut prev_delta = 0.0;
        let mut prev_years = contract.years_to_expiry();
        let mut bank = premium;

        for (t, &spot) in path[..steps].iter().enumerate() {
            let t = t as u32;
            let remaining = n - t;
            let years = remaining as f64 / DAYS_PER_YEAR;

            let delta = if remaining == 0 {
                expiry_delta(contract.option_type, spot, contract.strike)
            } else {
                let inputs = PricingInputs {
                    spot,
                    strike: contract.strike,
                    rate,
                    dividend,
                    volatility: vol,
                    years,
                    option_type: contract.option_type,
                };
                self.kernel.delta(&inputs)?
            };

            let holdings = delta * spot;
            let mut trade = (delta - prev_delta) * spot;
            if remaining == 0 {
                trade -= holdings;
            }

            let mut cost = trade.abs() * tc;
            if t == 0 {
                cost += premium * tc;
            }
            // Interest since the previous close; nothing accrues on day 0
            bank = bank * (rate * (prev_years - years)).exp() - (trade + cost);

            let cumulative_pnl = if remaining == 0 {
                bank - contract.intrinsic_value(spot)
            } else {
                bank + holdings
            };

            let record = HedgeDay {
                day: t,
                days_remaining: remaining,
                spot,
                delta,
                stock_holding_value: holdings,
                cash_flow_from_trade: trade,
                transaction_cost: cost,
                bank_balance: bank,
                cumulative_pnl,
            };
            tracing::debug!(
                day = t,
                spot,
                delta,
                trade,
                bank,
                pnl = cumulative_pnl,
                "hedge step"
            );
            days.push(record);

            prev_delta = delta;
            prev_years = years;
        }

        let report = HedgeReport::new(days, premium, vol);
        tracing::info!(
            strike = contract.strike,
            option_type = %contract.option_type,
            days = n,
            vol,
            total_costs = report.total_transaction_costs,
            terminal_pnl = report.terminal_pnl,
            "hedge simulation complete"
        );
        Ok(report)
    }
}

impl Default for DeltaHedgeSimulator {
    fn default() -> Self {
        Self::new(HedgeConfig::default())
    }
}

/// Delta in the T -> 0 limit; at-the-money resolves to zero exposure.
#[inline]
fn expiry_delta(option_type: OptionType, spot: f64, strike: f64) -> f64 {
    match option_type {
        OptionType::Call if spot > strike => 1.0,
        OptionType::Put if spot < strike => -1.0,
        _ => 0.0,
    }
}
