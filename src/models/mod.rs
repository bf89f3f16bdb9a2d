pub mod black_scholes;
pub mod implied_vol;
pub mod minimize;
pub mod rate_curve;
pub mod volatility;
