use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::feeds::market_data::MarketData;
use crate::models::volatility::Garch11;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Calendar days per year used to annualize every days-to-expiry figure.
pub const DAYS_PER_YEAR: f64 = 365.0;

// ── Contract terms ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// +1 for calls, -1 for puts.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Call => 1.0,
            Self::Put => -1.0,
        }
    }

    /// Flag used by the quote table: 0 = call, 1 = put.
    pub fn from_put_call_flag(flag: i64) -> EngineResult<Self> {
        match flag {
            0 => Ok(Self::Call),
            1 => Ok(Self::Put),
            other => Err(EngineError::Parse(format!("unknown put/call flag: {other}"))),
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl std::str::FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "call" | "c" | "0" => Ok(Self::Call),
            "put" | "p" | "1" => Ok(Self::Put),
            other => Err(format!("unknown option type: {other}")),
        }
    }
}

/// Immutable European option terms. Expiry is held in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct OptionContract {
    pub strike: f64,
    pub days_to_expiry: u32,
    pub option_type: OptionType,
}

impl OptionContract {
    pub fn new(strike: f64, days_to_expiry: u32, option_type: OptionType) -> EngineResult<Self> {
        if !(strike > 0.0 && strike.is_finite()) {
            return Err(EngineError::Domain(format!("strike must be positive: {strike}")));
        }
        if days_to_expiry == 0 {
            return Err(EngineError::Domain("days to expiry must be positive".into()));
        }
        Ok(Self {
            strike,
            days_to_expiry,
            option_type,
        })
    }

    #[inline]
    pub fn years_to_expiry(&self) -> f64 {
        self.days_to_expiry as f64 / DAYS_PER_YEAR
    }

    /// Payoff at expiry: max(sign * (spot - strike), 0).
    #[inline]
    pub fn intrinsic_value(&self, spot: f64) -> f64 {
        intrinsic_value(self.option_type, spot, self.strike)
    }
}

#[inline]
pub fn intrinsic_value(option_type: OptionType, spot: f64, strike: f64) -> f64 {
    (option_type.sign() * (spot - strike)).max(0.0)
}

// ── Market snapshot ──

/// Market inputs for one valuation date. Rates are continuously compounded decimals.
/// Temporal consistency of the four fields is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MarketState {
    pub spot: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
}

impl MarketState {
    #[inline]
    pub fn with_spot(self, spot: f64) -> Self {
        Self { spot, ..self }
    }

    #[inline]
    pub fn with_volatility(self, volatility: f64) -> Self {
        Self { volatility, ..self }
    }

    #[inline]
    pub fn with_rate(self, risk_free_rate: f64) -> Self {
        Self {
            risk_free_rate,
            ..self
        }
    }
}

// ── Kernel inputs (stack, Copy) ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricingInputs {
    pub spot: f64,
    pub strike: f64,
    pub rate: f64,
    pub dividend: f64,
    pub volatility: f64,
    pub years: f64,
    pub option_type: OptionType,
}

impl PricingInputs {
    pub fn new(contract: &OptionContract, market: &MarketState) -> Self {
        Self {
            spot: market.spot,
            strike: contract.strike,
            rate: market.risk_free_rate,
            dividend: market.dividend_yield,
            volatility: market.volatility,
            years: contract.years_to_expiry(),
            option_type: contract.option_type,
        }
    }

    #[inline]
    pub fn with_volatility(self, volatility: f64) -> Self {
        Self { volatility, ..self }
    }

    #[inline]
    pub fn with_spot(self, spot: f64) -> Self {
        Self { spot, ..self }
    }

    #[inline]
    pub fn with_days(self, days: f64) -> Self {
        Self {
            years: days / DAYS_PER_YEAR,
            ..self
        }
    }
}

// ── Kernel output (never stored) ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricingResult {
    pub value: f64,
    pub greeks: Option<Greeks>,
}

// ── Request counters (lock-free) ──

pub struct PerfCounters {
    pub prices_computed: AtomicU64,
    pub iv_solves: AtomicU64,
    pub iv_unconverged: AtomicU64,
    pub sweeps_run: AtomicU64,
    pub hedges_simulated: AtomicU64,
    pub errors_returned: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            prices_computed: AtomicU64::new(0),
            iv_solves: AtomicU64::new(0),
            iv_unconverged: AtomicU64::new(0),
            sweeps_run: AtomicU64::new(0),
            hedges_simulated: AtomicU64::new(0),
            errors_returned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

// ── Application shared state (read-only after startup) ──

pub struct AppState {
    pub config: AppConfig,
    pub market: Arc<MarketData>,
    /// Fitted once at startup; None when the training sample was too short.
    pub garch: Option<Garch11>,
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, market: Arc<MarketData>, garch: Option<Garch11>) -> Arc<Self> {
        Arc::new(Self {
            config,
            market,
            garch,
            counters: PerfCounters::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_rejects_bad_terms() {
        assert!(OptionContract::new(0.0, 30, OptionType::Call).is_err());
        assert!(OptionContract::new(-5.0, 30, OptionType::Put).is_err());
        assert!(OptionContract::new(100.0, 0, OptionType::Call).is_err());
        assert!(OptionContract::new(100.0, 30, OptionType::Call).is_ok());
    }

    #[test]
    fn test_intrinsic_value() {
        let call = OptionContract::new(100.0, 30, OptionType::Call).unwrap();
        let put = OptionContract::new(100.0, 30, OptionType::Put).unwrap();
        assert_eq!(call.intrinsic_value(110.0), 10.0);
        assert_eq!(call.intrinsic_value(90.0), 0.0);
        assert_eq!(put.intrinsic_value(90.0), 10.0);
        assert_eq!(put.intrinsic_value(110.0), 0.0);
    }

    #[test]
    fn test_option_type_parsing() {
        assert_eq!("call".parse::<OptionType>().unwrap(), OptionType::Call);
        assert_eq!("PUT".parse::<OptionType>().unwrap(), OptionType::Put);
        assert_eq!("1".parse::<OptionType>().unwrap(), OptionType::Put);
        assert!("straddle".parse::<OptionType>().is_err());
        assert_eq!(OptionType::from_put_call_flag(0).unwrap(), OptionType::Call);
        assert!(OptionType::from_put_call_flag(2).is_err());
    }

    #[test]
    fn test_inputs_derive_years_from_days() {
        let contract = OptionContract::new(2080.0, 73, OptionType::Call).unwrap();
        let market = MarketState {
            spot: 2090.0,
            risk_free_rate: 0.004,
            dividend_yield: 0.019,
            volatility: 0.15,
        };
        let inputs = PricingInputs::new(&contract, &market);
        assert!((inputs.years - 0.2).abs() < 1e-15);
        assert!((inputs.with_days(36.5).years - 0.1).abs() < 1e-15);
    }
}
