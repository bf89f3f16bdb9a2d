use crate::errors::{EngineError, EngineResult};
use crate::state::{Greeks, PricingInputs, PricingResult};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Black-Scholes-Merton European option pricing with continuous dividend yield.
///
/// d1 = (ln(S/K) + (r - q + sigma^2/2) T) / (sigma sqrt(T))
/// d2 = d1 - sigma sqrt(T)
/// V  = s * (S e^{-qT} Phi(s d1) - K e^{-rT} Phi(s d2)),  s = +1 call, -1 put
///
/// Every call validates its inputs and returns a fresh result. Nothing is cached.
#[derive(Debug, Clone)]
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

/// Intermediate terms shared by price and greeks.
#[derive(Debug, Clone, Copy)]
struct Terms {
    d1: f64,
    d2: f64,
    sqrt_t: f64,
    div_discount: f64,
    rate_discount: f64,
    sign: f64,
}

impl BlackScholes {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    pub fn name(&self) -> &'static str {
        "Black-Scholes-Merton"
    }

    /// Reject inputs that would otherwise produce NaN or infinities.
    pub fn validate(inputs: &PricingInputs) -> EngineResult<()> {
        if !(inputs.spot > 0.0 && inputs.spot.is_finite()) {
            return Err(EngineError::Domain(format!("spot must be positive: {}", inputs.spot)));
        }
        if !(inputs.strike > 0.0 && inputs.strike.is_finite()) {
            return Err(EngineError::Domain(format!(
                "strike must be positive: {}",
                inputs.strike
            )));
        }
        if !(inputs.volatility > 0.0 && inputs.volatility.is_finite()) {
            return Err(EngineError::Domain(format!(
                "volatility must be positive: {}",
                inputs.volatility
            )));
        }
        if !(inputs.years > 0.0 && inputs.years.is_finite()) {
            return Err(EngineError::Domain(format!(
                "time to expiry must be positive: {}",
                inputs.years
            )));
        }
        if !inputs.rate.is_finite() || !inputs.dividend.is_finite() {
            return Err(EngineError::Domain("rate and dividend must be finite".into()));
        }
        Ok(())
    }

    #[inline]
    fn terms(inputs: &PricingInputs) -> EngineResult<Terms> {
        Self::validate(inputs)?;
        let t = inputs.years;
        let sigma = inputs.volatility;
        let sqrt_t = t.sqrt();
        let sigma_sqrt_t = sigma * sqrt_t;
        let d1 = ((inputs.spot / inputs.strike).ln()
            + (inputs.rate - inputs.dividend + 0.5 * sigma * sigma) * t)
            / sigma_sqrt_t;
        Ok(Terms {
            d1,
            d2: d1 - sigma_sqrt_t,
            sqrt_t,
            div_discount: (-inputs.dividend * t).exp(),
            rate_discount: (-inputs.rate * t).exp(),
            sign: inputs.option_type.sign(),
        })
    }

    #[inline]
    fn value_from(&self, inputs: &PricingInputs, k: &Terms) -> f64 {
        k.sign
            * (inputs.spot * k.div_discount * self.normal.cdf(k.sign * k.d1)
                - inputs.strike * k.rate_discount * self.normal.cdf(k.sign * k.d2))
    }

    #[inline]
    fn greeks_from(&self, inputs: &PricingInputs, k: &Terms) -> Greeks {
        let pdf_d1 = self.normal.pdf(k.d1);
        Greeks {
            delta: k.sign * k.div_discount * self.normal.cdf(k.sign * k.d1),
            gamma: k.div_discount * pdf_d1 / (inputs.spot * inputs.volatility * k.sqrt_t),
            vega: inputs.spot * pdf_d1 * k.sqrt_t,
        }
    }

    pub fn price(&self, inputs: &PricingInputs) -> EngineResult<f64> {
        let k = Self::terms(inputs)?;
        Ok(self.value_from(inputs, &k))
    }

    /// dV/dS = s e^{-qT} Phi(s d1)
    pub fn delta(&self, inputs: &PricingInputs) -> EngineResult<f64> {
        let k = Self::terms(inputs)?;
        Ok(k.sign * k.div_discount * self.normal.cdf(k.sign * k.d1))
    }

    /// d2V/dS2 = e^{-qT} phi(d1) / (S sigma sqrt(T))
    pub fn gamma(&self, inputs: &PricingInputs) -> EngineResult<f64> {
        let k = Self::terms(inputs)?;
        Ok(self.greeks_from(inputs, &k).gamma)
    }

    /// S phi(d1) sqrt(T), per unit of volatility.
    pub fn vega(&self, inputs: &PricingInputs) -> EngineResult<f64> {
        let k = Self::terms(inputs)?;
        Ok(inputs.spot * self.normal.pdf(k.d1) * k.sqrt_t)
    }

    /// Price plus optional greeks from a single set of d1/d2 terms.
    pub fn evaluate(
        &self,
        inputs: &PricingInputs,
        with_greeks: bool,
    ) -> EngineResult<PricingResult> {
        let k = Self::terms(inputs)?;
        Ok(PricingResult {
            value: self.value_from(inputs, &k),
            greeks: with_greeks.then(|| self.greeks_from(inputs, &k)),
        })
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}
