use spx_desk::config::AppConfig;
use spx_desk::errors::EngineResult;
use spx_desk::feeds::market_data::MarketData;
use spx_desk::models::volatility::{log_returns_pct, Garch11, VolatilityForecaster};
use spx_desk::server;
use spx_desk::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("spx_desk starting");

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Static tables, read-only from here on
    let market = match MarketData::load(&cfg) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            tracing::error!("market data error: {e}");
            std::process::exit(1);
        }
    };

    let garch = match fit_garch(&market, cfg.garch_horizon_days) {
        Ok(g) => Some(g),
        Err(e) => {
            tracing::warn!("GARCH unavailable, forecast routes disabled: {e}");
            None
        }
    };

    if let Ok(spot) = market.spot() {
        tracing::info!(
            date = %market.valuation_date,
            spot,
            dividend_yield = market.dividend_yield,
            quotes = market.quotes.len(),
            "market snapshot ready"
        );
    }

    let port = cfg.server_port;
    let app = server::routes::router(AppState::new(cfg, market, garch)).layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}

/// Fit on percent log returns of adjusted closes up to the valuation date.
fn fit_garch(market: &MarketData, horizon_days: usize) -> EngineResult<Garch11> {
    let prices = market.series.adj_closes_through(market.valuation_date);
    let garch = Garch11::fit(&log_returns_pct(&prices)?)?;
    tracing::info!(
        horizon_days,
        forecast_vol_pct = garch.forecast_vol_pct(horizon_days)?,
        "volatility forecast ready"
    );
    Ok(garch)
}
