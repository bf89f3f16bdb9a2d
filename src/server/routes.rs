use crate::analytics::sensitivity::{taylor_shifts, SensitivityEngine, SweepAxis};
use crate::errors::{EngineError, EngineResult};
use crate::feeds::market_data::Quote;
use crate::hedge::simulator::{DeltaHedgeSimulator, HedgeConfig, VolatilitySource};
use crate::models::black_scholes::BlackScholes;
use crate::models::implied_vol::{ImpliedVolSolver, IvMethod};
use crate::models::volatility::{annualized_realized_vol_pct, Garch11, VolatilityForecaster};
use crate::state::{AppState, MarketState, OptionContract, OptionType, PerfCounters, PricingInputs};
use crate::strategy::iron_condor::IronCondor;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use std::sync::Arc;

#[derive(Debug, serde::Deserialize)]
pub struct ContractQuery {
    pub strike: f64,
    pub days: u32,
    pub option_type: OptionType,
    /// Overrides the listed implied vol
    pub vol: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ImpliedVolQuery {
    pub strike: f64,
    pub days: u32,
    pub option_type: OptionType,
    pub method: Option<IvMethod>,
    /// Overrides the quoted mid
    pub price: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SensitivityQuery {
    pub strike: f64,
    pub days: u32,
    pub option_type: OptionType,
    pub axis: SweepAxis,
    pub vol: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HedgeVolSource {
    #[default]
    Implied,
    Garch,
}

#[derive(Debug, serde::Deserialize)]
pub struct HedgeQuery {
    pub strike: f64,
    pub days: u32,
    pub option_type: OptionType,
    #[serde(default)]
    pub vol_source: HedgeVolSource,
}

#[derive(Debug, serde::Deserialize)]
pub struct CondorQuery {
    pub expiry_date: Option<NaiveDate>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/market", get(get_market))
        .route("/api/price", get(get_price))
        .route("/api/implied-vol", get(get_implied_vol))
        .route("/api/sensitivity", get(get_sensitivity))
        .route("/api/taylor", get(get_taylor))
        .route("/api/hedge", get(get_hedge))
        .route("/api/strategy/iron-condor", get(get_iron_condor))
        .route("/api/counters", get(get_counters))
        .with_state(state)
}

/// Serialize a result, or report the error as `{"error": ...}`.
fn respond(state: &AppState, result: EngineResult<serde_json::Value>) -> Json<serde_json::Value> {
    match result {
        Ok(body) => Json(body),
        Err(e) => {
            PerfCounters::bump(&state.counters.errors_returned);
            tracing::warn!(error = %e, "request failed");
            Json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// Contract, market snapshot and the listed quote (if any) for a request.
fn resolve(
    state: &AppState,
    strike: f64,
    days: u32,
    option_type: OptionType,
    vol: Option<f64>,
) -> EngineResult<(OptionContract, MarketState, Option<Quote>)> {
    let contract = OptionContract::new(strike, days, option_type)?;
    let quote = state.market.quotes.best_quote(strike, option_type).ok().copied();
    let volatility = vol.or(quote.map(|q| q.implied_vol)).ok_or_else(|| {
        EngineError::OutOfRange(format!("no listed {option_type} at {strike}; pass vol"))
    })?;
    let market = state.market.market_state(days, volatility)?;
    Ok((contract, market, quote))
}

/// GET /api/market -- valuation-date snapshot
pub async fn get_market(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    respond(&state, market_snapshot(&state))
}

/// GET /api/price -- BSM value and greeks
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ContractQuery>,
) -> Json<serde_json::Value> {
    respond(&state, price(&state, &q))
}

/// GET /api/implied-vol -- invert the quoted mid
pub async fn get_implied_vol(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ImpliedVolQuery>,
) -> Json<serde_json::Value> {
    respond(&state, implied_vol(&state, &q))
}

/// GET /api/sensitivity -- one-axis sweep on the canonical grid
pub async fn get_sensitivity(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SensitivityQuery>,
) -> Json<serde_json::Value> {
    respond(&state, sensitivity(&state, &q))
}

/// GET /api/taylor -- exact vs first/second-order spot expansions
pub async fn get_taylor(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ContractQuery>,
) -> Json<serde_json::Value> {
    respond(&state, taylor(&state, &q))
}

/// GET /api/hedge -- daily delta hedge over the historical path
pub async fn get_hedge(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HedgeQuery>,
) -> Json<serde_json::Value> {
    respond(&state, hedge(&state, &q))
}

/// GET /api/strategy/iron-condor -- GARCH-sized condor, optionally valued at expiry
pub async fn get_iron_condor(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CondorQuery>,
) -> Json<serde_json::Value> {
    respond(&state, iron_condor(&state, &q))
}

/// GET /api/counters -- request counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "prices_computed": state.counters.prices_computed.load(Relaxed),
        "iv_solves": state.counters.iv_solves.load(Relaxed),
        "iv_unconverged": state.counters.iv_unconverged.load(Relaxed),
        "sweeps_run": state.counters.sweeps_run.load(Relaxed),
        "hedges_simulated": state.counters.hedges_simulated.load(Relaxed),
        "errors_returned": state.counters.errors_returned.load(Relaxed),
    }))
}

// ── Request bodies ──

fn market_snapshot(state: &AppState) -> EngineResult<serde_json::Value> {
    let md = &state.market;
    let (lo, hi) = md.curve.domain();
    Ok(serde_json::json!({
        "valuation_date": md.valuation_date,
        "spot": md.spot()?,
        "dividend_yield": md.dividend_yield,
        "curve_domain_days": [lo, hi],
        "call_strikes": md.quotes.strikes(OptionType::Call),
        "put_strikes": md.quotes.strikes(OptionType::Put),
        "vix_pct": md.vix_pct().ok(),
        "garch": state.garch,
    }))
}

fn price(state: &AppState, q: &ContractQuery) -> EngineResult<serde_json::Value> {
    let (contract, market, quote) = resolve(state, q.strike, q.days, q.option_type, q.vol)?;
    let inputs = PricingInputs::new(&contract, &market);
    let priced = BlackScholes::new().evaluate(&inputs, true)?;
    PerfCounters::bump(&state.counters.prices_computed);
    Ok(serde_json::json!({
        "inputs": inputs,
        "result": priced,
        "market_mid": quote.map(|q| q.mid()),
    }))
}

fn implied_vol(state: &AppState, q: &ImpliedVolQuery) -> EngineResult<serde_json::Value> {
    let contract = OptionContract::new(q.strike, q.days, q.option_type)?;
    let quote = state.market.quotes.best_quote(q.strike, q.option_type).ok().copied();
    let target = match (q.price, quote) {
        (Some(p), _) => p,
        (None, Some(quote)) => quote.mid(),
        (None, None) => {
            return Err(EngineError::OutOfRange(format!(
                "no listed {} at {}; pass price",
                q.option_type, q.strike
            )))
        }
    };
    // placeholder volatility, replaced by the solver
    let market = state.market.market_state(q.days, 1.0)?;
    let method = q.method.unwrap_or(state.config.iv_method);
    let solution =
        ImpliedVolSolver::default().solve(method, &PricingInputs::new(&contract, &market), target)?;

    PerfCounters::bump(&state.counters.iv_solves);
    if !solution.converged {
        PerfCounters::bump(&state.counters.iv_unconverged);
    }
    Ok(serde_json::json!({
        "target_price": target,
        "solution": solution,
        "listed_iv": quote.map(|q| q.implied_vol),
    }))
}

fn sensitivity(state: &AppState, q: &SensitivityQuery) -> EngineResult<serde_json::Value> {
    let (contract, market, _) = resolve(state, q.strike, q.days, q.option_type, q.vol)?;
    let points =
        SensitivityEngine::new().sweep(&contract, &market, q.axis, Some(&state.market.curve))?;
    PerfCounters::bump(&state.counters.sweeps_run);
    Ok(serde_json::json!({ "axis": q.axis, "base": market, "points": points }))
}

fn taylor(state: &AppState, q: &ContractQuery) -> EngineResult<serde_json::Value> {
    let (contract, market, _) = resolve(state, q.strike, q.days, q.option_type, q.vol)?;
    let points = SensitivityEngine::new().taylor_comparison(&contract, &market, &taylor_shifts())?;
    PerfCounters::bump(&state.counters.sweeps_run);
    Ok(serde_json::json!({ "base": market, "points": points }))
}

fn hedge(state: &AppState, q: &HedgeQuery) -> EngineResult<serde_json::Value> {
    let contract = OptionContract::new(q.strike, q.days, q.option_type)?;
    let quote = *state.market.quotes.best_quote(q.strike, q.option_type)?;
    let market = state.market.market_state(q.days, quote.implied_vol)?;
    let path = state
        .market
        .series
        .window(state.market.valuation_date, q.days as usize + 1)?;

    let volatility = match q.vol_source {
        HedgeVolSource::Implied => VolatilitySource::Implied(quote.implied_vol),
        HedgeVolSource::Garch => VolatilitySource::Forecast {
            forecaster: fitted_garch(state)?,
            horizon_days: state.config.garch_horizon_days,
        },
    };

    let simulator = DeltaHedgeSimulator::new(HedgeConfig {
        transaction_cost_rate: state.config.transaction_cost_rate,
    });
    let report = simulator.run(
        &contract,
        market.risk_free_rate,
        market.dividend_yield,
        quote.mid(),
        volatility,
        &path,
    )?;
    PerfCounters::bump(&state.counters.hedges_simulated);
    Ok(serde_json::json!(report))
}

fn iron_condor(state: &AppState, q: &CondorQuery) -> EngineResult<serde_json::Value> {
    let garch = fitted_garch(state)?;
    let vol_pct = garch.forecast_vol_pct(state.config.garch_horizon_days)?;
    let md = &state.market;
    let condor = IronCondor::build(md.spot()?, vol_pct, &md.quotes)?;

    let mut body = serde_json::json!({
        "condor": condor,
        "payoff_curve": condor.payoff_curve(),
        "volatility_pct": {
            "garch_forecast": vol_pct,
            "garch_in_sample": garch.in_sample_vol_pct,
            "vix": md.vix_pct().ok(),
        },
    });
    if let Some(expiry) = q.expiry_date {
        let close = md.series.close_on(expiry)?;
        let window = md.series.adj_closes_between(md.valuation_date, expiry);
        let realized = annualized_realized_vol_pct(&window)?;
        body["at_expiry"] = serde_json::json!(condor.value_at_expiry(close));
        body["volatility_pct"]["realized"] = serde_json::json!(realized);
    }
    Ok(body)
}

fn fitted_garch(state: &AppState) -> EngineResult<&Garch11> {
    state
        .garch
        .as_ref()
        .ok_or_else(|| EngineError::Forecast("no fitted GARCH model".into()))
}
