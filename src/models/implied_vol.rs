use crate::errors::{EngineError, EngineResult};
use crate::models::black_scholes::BlackScholes;
use crate::models::minimize::BoundedMinimizer;
use crate::state::PricingInputs;

/// Which inversion algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IvMethod {
    /// Newton-Raphson on vega, handing over to `Bounded` when vega vanishes
    NewtonRaphson,
    /// Derivative-free minimization of |price(vol) - target| on the admissible bracket
    Bounded,
}

impl std::fmt::Display for IvMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewtonRaphson => write!(f, "newton"),
            Self::Bounded => write!(f, "bounded"),
        }
    }
}

impl std::str::FromStr for IvMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newton" | "newton_raphson" | "newton-raphson" => Ok(Self::NewtonRaphson),
            "bounded" | "brent" => Ok(Self::Bounded),
            other => Err(format!("unknown IV method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IvSolverConfig {
    /// Admissible volatility bracket
    pub lower: f64,
    pub upper: f64,
    /// Newton starting point
    pub initial_guess: f64,
    /// |target - price| below this counts as converged (both methods)
    pub price_tolerance: f64,
    pub max_iterations: usize,
    /// Newton hands over to the bounded method below this vega
    pub vega_floor: f64,
    pub minimizer: BoundedMinimizer,
}

impl Default for IvSolverConfig {
    fn default() -> Self {
        Self {
            lower: 0.01,
            upper: 3.0,
            initial_guess: 0.5,
            price_tolerance: 1e-5,
            max_iterations: 1000,
            vega_floor: 1e-8,
            minimizer: BoundedMinimizer::default(),
        }
    }
}

/// Solver output. `converged == false` marks an untrusted best estimate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ImpliedVolSolution {
    pub volatility: f64,
    pub converged: bool,
    /// Method that produced `volatility`
    pub method: IvMethod,
    /// True when Newton-Raphson was requested but handed over to the bounded method
    pub fell_back: bool,
    pub iterations: usize,
    /// |price(volatility) - target|
    pub residual: f64,
}

/// Recovers the volatility that reproduces an observed option price.
pub struct ImpliedVolSolver {
    kernel: BlackScholes,
    config: IvSolverConfig,
}

impl ImpliedVolSolver {
    pub fn new(config: IvSolverConfig) -> Self {
        Self {
            kernel: BlackScholes::new(),
            config,
        }
    }

    pub fn config(&self) -> &IvSolverConfig {
        &self.config
    }

    /// Solve for volatility. `inputs.volatility` is ignored.
    ///
    /// Fails only on invalid non-volatility inputs; an unreachable target
    /// comes back as an unconverged solution.
    pub fn solve(
        &self,
        method: IvMethod,
        inputs: &PricingInputs,
        target_price: f64,
    ) -> EngineResult<ImpliedVolSolution> {
        BlackScholes::validate(&inputs.with_volatility(self.config.initial_guess))?;
        if !target_price.is_finite() {
            return Err(EngineError::Domain(format!(
                "target price must be finite: {target_price}"
            )));
        }

        let solution = match method {
            IvMethod::NewtonRaphson => self.newton(inputs, target_price)?,
            IvMethod::Bounded => self.bounded(inputs, target_price)?,
        };

        if !solution.converged {
            tracing::warn!(
                strike = inputs.strike,
                target = target_price,
                vol = solution.volatility,
                residual = solution.residual,
                method = %solution.method,
                "implied vol did not converge"
            );
        }
        Ok(solution)
    }

    fn newton(&self, inputs: &PricingInputs, target: f64) -> EngineResult<ImpliedVolSolution> {
        let cfg = &self.config;
        let mut vol = cfg.initial_guess;
        let mut residual = f64::INFINITY;

        for iteration in 0..cfg.max_iterations {
            let at = inputs.with_volatility(vol);
            let diff = target - self.kernel.price(&at)?;
            residual = diff.abs();

            if residual < cfg.price_tolerance {
                return Ok(ImpliedVolSolution {
                    volatility: vol,
                    converged: true,
                    method: IvMethod::NewtonRaphson,
                    fell_back: false,
                    iterations: iteration,
                    residual,
                });
            }

            let vega = self.kernel.vega(&at)?;
            if vega < cfg.vega_floor {
                tracing::debug!(
                    vol,
                    vega,
                    iteration,
                    "vega too small, switching to bounded search"
                );
                return self.fall_back(inputs, target, iteration);
            }

            let next = vol + diff / vega;
            if !next.is_finite() || next <= 0.0 || next > cfg.upper {
                tracing::debug!(vol, next, iteration, "newton step left admissible range");
                return self.fall_back(inputs, target, iteration);
            }
            vol = next;
        }

        Ok(ImpliedVolSolution {
            volatility: vol,
            converged: false,
            method: IvMethod::NewtonRaphson,
            fell_back: false,
            iterations: cfg.max_iterations,
            residual,
        })
    }

    fn fall_back(
        &self,
        inputs: &PricingInputs,
        target: f64,
        newton_iterations: usize,
    ) -> EngineResult<ImpliedVolSolution> {
        let mut solution = self.bounded(inputs, target)?;
        solution.fell_back = true;
        solution.iterations += newton_iterations;
        Ok(solution)
    }

    fn bounded(&self, inputs: &PricingInputs, target: f64) -> EngineResult<ImpliedVolSolution> {
        let cfg = &self.config;
        let objective = |vol: f64| {
            self.kernel
                .price(&inputs.with_volatility(vol))
                .map(|p| (p - target).abs())
                .unwrap_or(f64::INFINITY)
        };
        let min = cfg.minimizer.minimize(objective, cfg.lower, cfg.upper)?;

        Ok(ImpliedVolSolution {
            volatility: min.x,
            converged: min.fx <= cfg.price_tolerance,
            method: IvMethod::Bounded,
            fell_back: false,
            iterations: min.iterations,
            residual: min.fx,
        })
    }
}

impl Default for ImpliedVolSolver {
    fn default() -> Self {
        Self::new(IvSolverConfig::default())
    }
}
