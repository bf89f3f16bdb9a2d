use crate::errors::{EngineError, EngineResult};
use crate::models::implied_vol::IvMethod;
use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub rate_curve_file: String,
    pub dividend_file: String,
    pub underlying_file: String,
    pub option_quotes_file: String,
    /// Same layout as the underlying series; optional at startup
    pub vix_file: String,
    pub valuation_date: NaiveDate,
    pub transaction_cost_rate: f64,
    pub iv_method: IvMethod,
    pub garch_horizon_days: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let valuation_date = NaiveDate::parse_from_str(
            &env_var_or("VALUATION_DATE", "2015-08-12"),
            "%Y-%m-%d",
        )
        .map_err(|e| EngineError::Config(format!("VALUATION_DATE: {e}")))?;

        let transaction_cost_rate = env_var_or("TRANSACTION_COST_RATE", "0.0005")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("TRANSACTION_COST_RATE: {e}")))?;
        if !(0.0..1.0).contains(&transaction_cost_rate) {
            return Err(EngineError::Config(format!(
                "TRANSACTION_COST_RATE must be in [0, 1): {transaction_cost_rate}"
            )));
        }

        let iv_method = env_var_or("IV_METHOD", "newton")
            .parse::<IvMethod>()
            .map_err(|e| EngineError::Config(format!("IV_METHOD: {e}")))?;

        let garch_horizon_days = env_var_or("GARCH_HORIZON_DAYS", "22")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("GARCH_HORIZON_DAYS: {e}")))?;

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        Ok(Self {
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            rate_curve_file: env_var_or("RATE_CURVE_FILE", "ZeroCurve.csv"),
            dividend_file: env_var_or("DIVIDEND_FILE", "SPXDivYield.csv"),
            underlying_file: env_var_or("UNDERLYING_FILE", "SPXDaily1950.csv"),
            option_quotes_file: env_var_or("OPTION_QUOTES_FILE", "OptionData.csv"),
            vix_file: env_var_or("VIX_FILE", "VIXDaily.csv"),
            valuation_date,
            transaction_cost_rate,
            iv_method,
            garch_horizon_days,
            server_port,
        })
    }

    pub fn rate_curve_path(&self) -> PathBuf {
        self.data_dir.join(&self.rate_curve_file)
    }

    pub fn dividend_path(&self) -> PathBuf {
        self.data_dir.join(&self.dividend_file)
    }

    pub fn underlying_path(&self) -> PathBuf {
        self.data_dir.join(&self.underlying_file)
    }

    pub fn option_quotes_path(&self) -> PathBuf {
        self.data_dir.join(&self.option_quotes_file)
    }

    pub fn vix_path(&self) -> PathBuf {
        self.data_dir.join(&self.vix_file)
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
