use crate::errors::{EngineError, EngineResult};
use crate::models::volatility::TRADING_DAYS_PER_YEAR;
use crate::state::{intrinsic_value, OptionType};
use smallvec::SmallVec;

/// Trading days in one option month
const OPTION_MONTH_DAYS: f64 = 22.0;
/// Strikes are listed on a 10-point grid
const STRIKE_STEP: f64 = 10.0;

/// Anything that can quote a mid price for a listed strike.
pub trait QuoteSource {
    fn mid_price(&self, strike: f64, option_type: OptionType) -> EngineResult<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Leg {
    pub name: &'static str,
    pub position: Position,
    pub option_type: OptionType,
    pub strike: f64,
    pub premium: f64,
}

impl Leg {
    /// Expiry P&L per unit, net of premium.
    #[inline]
    pub fn payoff(&self, spot: f64) -> f64 {
        let long = intrinsic_value(self.option_type, spot, self.strike) - self.premium;
        match self.position {
            Position::Long => long,
            Position::Short => -long,
        }
    }

    /// Cash at inception: premium received when short, paid when long.
    #[inline]
    pub fn cost(&self) -> f64 {
        match self.position {
            Position::Long => -self.premium,
            Position::Short => self.premium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PayoffPoint {
    pub spot: f64,
    pub payoff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LegValuation {
    pub name: &'static str,
    pub cost: f64,
    pub value_at_expiry: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExpiryValuation {
    pub close: f64,
    pub legs: SmallVec<[LegValuation; 4]>,
    pub total_cost: f64,
    pub total_value: f64,
}

/// Short strangle one forecast sigma wide, with long wings bought one
/// collected-premium further out.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IronCondor {
    pub spot: f64,
    pub forecast_vol_pct: f64,
    /// One-sigma relative move over an option month
    pub monthly_move: f64,
    pub legs: SmallVec<[Leg; 4]>,
    pub net_credit: f64,
}

#[inline]
fn round_to_strike(x: f64) -> f64 {
    (x / STRIKE_STEP).round_ties_even() * STRIKE_STEP
}

impl IronCondor {
    pub fn build(
        spot: f64,
        forecast_vol_pct: f64,
        quotes: &impl QuoteSource,
    ) -> EngineResult<Self> {
        if !(spot > 0.0 && spot.is_finite()) {
            return Err(EngineError::Domain(format!("spot must be positive: {spot}")));
        }
        if !(forecast_vol_pct > 0.0 && forecast_vol_pct.is_finite()) {
            return Err(EngineError::Domain(format!(
                "forecast volatility must be positive: {forecast_vol_pct}"
            )));
        }

        let monthly_move =
            forecast_vol_pct * (OPTION_MONTH_DAYS / TRADING_DAYS_PER_YEAR).sqrt() / 100.0;
        let short_call_strike = round_to_strike(spot * (1.0 + monthly_move));
        let short_put_strike = round_to_strike(spot * (1.0 - monthly_move));
        let p1 = quotes.mid_price(short_call_strike, OptionType::Call)?;
        let p2 = quotes.mid_price(short_put_strike, OptionType::Put)?;

        let long_call_strike = round_to_strike(short_call_strike + p1 + p2);
        let long_put_strike = round_to_strike(short_put_strike - p1 - p2);
        let p3 = quotes.mid_price(long_call_strike, OptionType::Call)?;
        let p4 = quotes.mid_price(long_put_strike, OptionType::Put)?;

        let legs: SmallVec<[Leg; 4]> = SmallVec::from_buf([
            Leg {
                name: "Short Call",
                position: Position::Short,
                option_type: OptionType::Call,
                strike: short_call_strike,
                premium: p1,
            },
            Leg {
                name: "Short Put",
                position: Position::Short,
                option_type: OptionType::Put,
                strike: short_put_strike,
                premium: p2,
            },
            Leg {
                name: "Long Call",
                position: Position::Long,
                option_type: OptionType::Call,
                strike: long_call_strike,
                premium: p3,
            },
            Leg {
                name: "Long Put",
                position: Position::Long,
                option_type: OptionType::Put,
                strike: long_put_strike,
                premium: p4,
            },
        ]);

        let condor = Self {
            spot,
            forecast_vol_pct,
            monthly_move,
            net_credit: legs.iter().map(Leg::cost).sum(),
            legs,
        };
        tracing::info!(
            spot,
            vol_pct = forecast_vol_pct,
            short_call = short_call_strike,
            short_put = short_put_strike,
            long_call = long_call_strike,
            long_put = long_put_strike,
            credit = condor.net_credit,
            "iron condor built"
        );
        Ok(condor)
    }

    #[inline]
    pub fn payoff_at(&self, spot: f64) -> f64 {
        self.legs.iter().map(|leg| leg.payoff(spot)).sum()
    }

    /// Combined expiry payoff over 0.8 S ..= 1.2 S in steps of 0.01 S.
    pub fn payoff_curve(&self) -> Vec<PayoffPoint> {
        (0..=40)
            .map(|i| {
                let spot = self.spot * (0.8 + 0.01 * i as f64);
                PayoffPoint {
                    spot,
                    payoff: self.payoff_at(spot),
                }
            })
            .collect()
    }

    /// Per-leg cost and value given the underlying close at expiry.
    pub fn value_at_expiry(&self, close: f64) -> ExpiryValuation {
        let legs: SmallVec<[LegValuation; 4]> = self
            .legs
            .iter()
            .map(|leg| LegValuation {
                name: leg.name,
                cost: leg.cost(),
                value_at_expiry: leg.payoff(close),
            })
            .collect();
        ExpiryValuation {
            close,
            total_cost: legs.iter().map(|l| l.cost).sum(),
            total_value: legs.iter().map(|l| l.value_at_expiry).sum(),
            legs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Book(HashMap<(i64, OptionType), f64>);

    impl QuoteSource for Book {
        fn mid_price(&self, strike: f64, option_type: OptionType) -> EngineResult<f64> {
            self.0
                .get(&(strike as i64, option_type))
                .copied()
                .ok_or_else(|| {
                    EngineError::OutOfRange(format!("no quote for {option_type} {strike}"))
                })
        }
    }

    fn book() -> Book {
        Book(HashMap::from([
            ((2170, OptionType::Call), 10.0),
            ((2000, OptionType::Put), 20.0),
            ((2200, OptionType::Call), 4.0),
            ((1970, OptionType::Put), 15.0),
        ]))
    }

    #[test]
    fn test_strike_selection() {
        let condor = IronCondor::build(2086.59, 13.5, &book()).unwrap();
        let strikes: Vec<f64> = condor.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes, vec![2170.0, 2000.0, 2200.0, 1970.0]);
        assert!((condor.net_credit - 11.0).abs() < 1e-12);
        assert!((condor.monthly_move - 0.135 * (22.0f64 / 252.0).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_payoff_shape() {
        let condor = IronCondor::build(2086.59, 13.5, &book()).unwrap();
        assert!((condor.payoff_at(2086.0) - 11.0).abs() < 1e-12);
        assert!((condor.payoff_at(2300.0) + 19.0).abs() < 1e-12);
        assert!((condor.payoff_at(1900.0) + 19.0).abs() < 1e-12);

        let curve = condor.payoff_curve();
        assert_eq!(curve.len(), 41);
        assert!((curve[0].spot - 0.8 * 2086.59).abs() < 1e-9);
        assert!((curve[40].spot - 1.2 * 2086.59).abs() < 1e-9);
        assert!(curve.iter().all(|p| p.payoff <= 11.0 + 1e-12 && p.payoff >= -19.0 - 1e-12));
    }

    #[test]
    fn test_expiry_table() {
        let condor = IronCondor::build(2086.59, 13.5, &book()).unwrap();
        let table = condor.value_at_expiry(2090.0);
        let costs: Vec<f64> = table.legs.iter().map(|l| l.cost).collect();
        assert_eq!(costs, vec![10.0, 20.0, -4.0, -15.0]);
        assert!((table.total_cost - 11.0).abs() < 1e-12);
        assert!((table.total_value - 11.0).abs() < 1e-12);

        let breached = condor.value_at_expiry(2180.0);
        assert!((breached.legs[0].value_at_expiry - 0.0).abs() < 1e-12);
        assert!((breached.total_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_quote_propagates() {
        let mut b = book();
        b.0.remove(&(2200, OptionType::Call));
        assert!(matches!(
            IronCondor::build(2086.59, 13.5, &b),
            Err(EngineError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(IronCondor::build(0.0, 13.5, &book()).is_err());
        assert!(IronCondor::build(2086.59, -1.0, &book()).is_err());
    }

    #[test]
    fn test_strike_rounding_ties_to_even() {
        assert_eq!(round_to_strike(2165.0), 2160.0);
        assert_eq!(round_to_strike(2175.0), 2180.0);
        assert_eq!(round_to_strike(2171.2), 2170.0);
    }
}
