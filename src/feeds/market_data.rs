use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::rate_curve::RateCurve;
use crate::state::{MarketState, OptionType};
use crate::strategy::iron_condor::QuoteSource;
use chrono::{Days, NaiveDate};
use std::path::Path;
use std::str::FromStr;

/// Date format used by the curve, dividend and quote tables
const TABLE_DATE_FORMAT: &str = "%d/%m/%Y";
/// Listed implied vol meaning "no quote"
const NO_QUOTE_IV: f64 = -99.99;
/// Quote strikes are stored multiplied by this
const STRIKE_SCALE: f64 = 1000.0;

// ── CSV helpers ──

fn open(path: &Path) -> EngineResult<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))
}

fn field<T: FromStr>(record: &csv::StringRecord, idx: usize, name: &str) -> EngineResult<T>
where
    T::Err: std::fmt::Display,
{
    let raw = record
        .get(idx)
        .ok_or_else(|| EngineError::Parse(format!("missing column {name} (#{idx})")))?;
    raw.parse::<T>()
        .map_err(|e| EngineError::Parse(format!("{name} = {raw:?}: {e}")))
}

fn table_date(record: &csv::StringRecord, idx: usize) -> EngineResult<NaiveDate> {
    let raw = record
        .get(idx)
        .ok_or_else(|| EngineError::Parse(format!("missing date column #{idx}")))?;
    Ok(NaiveDate::parse_from_str(raw, TABLE_DATE_FORMAT)?)
}

/// Spreadsheet serial day number (days since 1899-12-30) to a calendar date.
pub fn serial_to_date(serial: f64) -> EngineResult<NaiveDate> {
    if !(serial >= 0.0 && serial.is_finite()) {
        return Err(EngineError::Parse(format!("invalid serial date: {serial}")));
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_days(Days::new(serial.floor() as u64)))
        .ok_or_else(|| EngineError::Parse(format!("serial date out of range: {serial}")))
}

// ── Zero curve and dividend yield ──

/// Zero curve rows `(Date, Days, Rate%)` for one date; rates become decimals.
pub fn load_rate_curve(path: &Path, date: NaiveDate) -> EngineResult<RateCurve> {
    let mut reader = open(path)?;
    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        if table_date(&record, 0)? != date {
            continue;
        }
        let days: f64 = field(&record, 1, "Days")?;
        let rate_pct: f64 = field(&record, 2, "Rate")?;
        points.push((days, rate_pct / 100.0));
    }
    if points.is_empty() {
        return Err(EngineError::MissingData(format!("no zero curve for {date}")));
    }
    tracing::info!(points = points.len(), %date, "zero curve loaded");
    RateCurve::new(points)
}

/// Dividend yield (third column, percent) for one date, as a decimal.
pub fn load_dividend_yield(path: &Path, date: NaiveDate) -> EngineResult<f64> {
    let mut reader = open(path)?;
    for record in reader.records() {
        let record = record?;
        if table_date(&record, 0)? == date {
            let pct: f64 = field(&record, 2, "Yield")?;
            tracing::info!(%date, yield_pct = pct, "dividend yield loaded");
            return Ok(pct / 100.0);
        }
    }
    Err(EngineError::MissingData(format!("no dividend yield for {date}")))
}

// ── Underlying series ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SpotBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
}

/// Daily bars in date order, one per trading day.
#[derive(Debug, Clone)]
pub struct SpotSeries {
    bars: Vec<SpotBar>,
}

impl SpotSeries {
    pub fn new(mut bars: Vec<SpotBar>) -> EngineResult<Self> {
        bars.sort_by_key(|b| b.date);
        if bars.windows(2).any(|w| w[0].date == w[1].date) {
            return Err(EngineError::Parse("underlying series has duplicate dates".into()));
        }
        Ok(Self { bars })
    }

    /// `(serial date, Open, High, Low, Close, Adj Close)` rows.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let mut reader = open(path)?;
        let mut bars = Vec::new();
        for record in reader.records() {
            let record = record?;
            bars.push(SpotBar {
                date: serial_to_date(field(&record, 0, "Date")?)?,
                open: field(&record, 1, "Open")?,
                high: field(&record, 2, "High")?,
                low: field(&record, 3, "Low")?,
                close: field(&record, 4, "Close")?,
                adj_close: field(&record, 5, "Adj Close")?,
            });
        }
        tracing::info!(bars = bars.len(), "underlying series loaded");
        Self::new(bars)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    fn position(&self, date: NaiveDate) -> EngineResult<usize> {
        self.bars
            .binary_search_by_key(&date, |b| b.date)
            .map_err(|_| EngineError::MissingData(format!("no underlying observation on {date}")))
    }

    pub fn bar_on(&self, date: NaiveDate) -> EngineResult<&SpotBar> {
        Ok(&self.bars[self.position(date)?])
    }

    pub fn close_on(&self, date: NaiveDate) -> EngineResult<f64> {
        Ok(self.bar_on(date)?.close)
    }

    pub fn adj_close_on(&self, date: NaiveDate) -> EngineResult<f64> {
        Ok(self.bar_on(date)?.adj_close)
    }

    /// Adjusted closes of the `len` consecutive observations starting at `start`.
    pub fn window(&self, start: NaiveDate, len: usize) -> EngineResult<Vec<f64>> {
        let from = self.position(start)?;
        let bars = self.bars.get(from..from + len).ok_or_else(|| {
            EngineError::MissingData(format!(
                "need {len} observations from {start}, series has {}",
                self.bars.len() - from
            ))
        })?;
        Ok(bars.iter().map(|b| b.adj_close).collect())
    }

    /// Adjusted closes up to and including `date`.
    pub fn adj_closes_through(&self, date: NaiveDate) -> Vec<f64> {
        let end = self.bars.partition_point(|b| b.date <= date);
        self.bars[..end].iter().map(|b| b.adj_close).collect()
    }

    /// Adjusted closes with `from <= date <= to`.
    pub fn adj_closes_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<f64> {
        self.bars
            .iter()
            .filter(|b| b.date >= from && b.date <= to)
            .map(|b| b.adj_close)
            .collect()
    }
}

// ── Option quotes ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Quote {
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub open_interest: f64,
    /// Listed implied volatility (decimal)
    pub implied_vol: f64,
}

impl Quote {
    #[inline]
    pub fn mid(&self) -> f64 {
        0.5 * (self.bid + self.ask)
    }
}

/// Quotes for a single trade date with no-quote rows removed.
#[derive(Debug, Clone, Default)]
pub struct OptionQuotes {
    quotes: Vec<Quote>,
}

impl OptionQuotes {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self { quotes }
    }

    /// `(tradeDate, strike x 1000, put=1/call=0, bid, ask, volume, OI, IV)` rows for `date`.
    pub fn load(path: &Path, date: NaiveDate) -> EngineResult<Self> {
        let mut reader = open(path)?;
        let mut quotes = Vec::new();
        let mut dropped = 0usize;
        for record in reader.records() {
            let record = record?;
            if table_date(&record, 0)? != date {
                continue;
            }
            let implied_vol: f64 = field(&record, 7, "Implied Vol")?;
            if (implied_vol - NO_QUOTE_IV).abs() < 1e-9 {
                dropped += 1;
                continue;
            }
            quotes.push(Quote {
                strike: field::<f64>(&record, 1, "Strike x 1000")? / STRIKE_SCALE,
                option_type: OptionType::from_put_call_flag(field(&record, 2, "Put=1 Call=0")?)?,
                bid: field(&record, 3, "Bid")?,
                ask: field(&record, 4, "Ask")?,
                volume: field(&record, 5, "Volume")?,
                open_interest: field(&record, 6, "Open Interest")?,
                implied_vol,
            });
        }
        tracing::info!(quotes = quotes.len(), dropped, %date, "option quotes loaded");
        Ok(Self { quotes })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Most open interest among quotes for this strike and type.
    pub fn best_quote(&self, strike: f64, option_type: OptionType) -> EngineResult<&Quote> {
        self.quotes
            .iter()
            .filter(|q| q.option_type == option_type && (q.strike - strike).abs() < 1e-9)
            .max_by(|a, b| a.open_interest.total_cmp(&b.open_interest))
            .ok_or_else(|| {
                EngineError::OutOfRange(format!("no {option_type} quote at strike {strike}"))
            })
    }

    /// Distinct listed strikes for one type, ascending.
    pub fn strikes(&self, option_type: OptionType) -> Vec<f64> {
        let mut strikes: Vec<f64> = self
            .quotes
            .iter()
            .filter(|q| q.option_type == option_type)
            .map(|q| q.strike)
            .collect();
        strikes.sort_by(f64::total_cmp);
        strikes.dedup();
        strikes
    }
}

impl QuoteSource for OptionQuotes {
    fn mid_price(&self, strike: f64, option_type: OptionType) -> EngineResult<f64> {
        Ok(self.best_quote(strike, option_type)?.mid())
    }
}

// ── Bundle ──

/// The VIX table shares the underlying series layout. A missing or unreadable
/// file only disables the VIX comparison.
fn load_vix(path: &Path) -> Option<SpotSeries> {
    match SpotSeries::load(path) {
        Ok(series) => Some(series),
        Err(e) => {
            tracing::warn!("VIX series unavailable: {e}");
            None
        }
    }
}

/// Every table the desk reads, loaded once for one valuation date.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub valuation_date: NaiveDate,
    pub curve: RateCurve,
    pub dividend_yield: f64,
    pub series: SpotSeries,
    pub quotes: OptionQuotes,
    /// VIX daily series, when the file is present
    pub vix: Option<SpotSeries>,
}

impl MarketData {
    pub fn load(cfg: &AppConfig) -> EngineResult<Self> {
        let date = cfg.valuation_date;
        let data = Self {
            valuation_date: date,
            curve: load_rate_curve(&cfg.rate_curve_path(), date)?,
            dividend_yield: load_dividend_yield(&cfg.dividend_path(), date)?,
            series: SpotSeries::load(&cfg.underlying_path())?,
            quotes: OptionQuotes::load(&cfg.option_quotes_path(), date)?,
            vix: load_vix(&cfg.vix_path()),
        };
        // The spot must exist for every pricing request; fail at startup instead.
        data.spot()?;
        Ok(data)
    }

    /// Adjusted close on the valuation date.
    pub fn spot(&self) -> EngineResult<f64> {
        self.series.adj_close_on(self.valuation_date)
    }

    /// VIX adjusted close on the valuation date, in volatility percent.
    pub fn vix_pct(&self) -> EngineResult<f64> {
        self.vix
            .as_ref()
            .ok_or_else(|| EngineError::MissingData("no VIX series loaded".into()))?
            .adj_close_on(self.valuation_date)
    }

    /// Market snapshot for an option with `days` to expiry, rate read off the curve.
    pub fn market_state(&self, days: u32, volatility: f64) -> EngineResult<MarketState> {
        Ok(MarketState {
            spot: self.spot()?,
            risk_free_rate: self.curve.rate(days as f64)?,
            dividend_yield: self.dividend_yield,
            volatility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CURVE: &str = "Date,Days,Rate\n\
        11/08/2015,9,0.10\n\
        12/08/2015,9,0.1734\n\
        12/08/2015,37,0.2523\n\
        12/08/2015,365,0.6500\n";

    const DIVIDENDS: &str = "Date,Ticker,Yield\n\
        11/08/2015,SPX,1.95\n\
        12/08/2015,SPX,1.9372\n";

    // 2015-08-12 = 42228; 15th/16th are a weekend
    const SERIES: &str = "Date,Open,High,Low,Close,Adj Close\n\
        42226,2080.0,2090.0,2070.0,2084.07,2084.07\n\
        42227,2084.0,2085.0,2052.0,2076.62,2076.62\n\
        42228,2076.0,2087.0,2052.0,2086.05,2086.05\n\
        42229,2086.0,2093.0,2076.0,2083.39,2083.39\n\
        42230,2083.0,2092.0,2080.0,2091.54,2091.54\n\
        42233,2089.0,2102.0,2079.0,2102.44,2102.44\n";

    const QUOTES: &str = "\
        Trade dAte,Strike x 1000,Put=1 Call=0,Bid,Ask,Volume,Open Interest,Implied Vol\n\
        12/08/2015,2080000,0,39.1,40.5,120,3000,0.1521\n\
        12/08/2015,2080000,0,38.0,41.0,5,100,0.1530\n\
        12/08/2015,2080000,1,31.2,32.6,300,5000,0.1610\n\
        12/08/2015,2100000,0,0.0,0.0,0,0,-99.99\n\
        12/08/2015,2000000,1,10.0,11.0,50,800,0.2010\n\
        11/08/2015,2080000,0,45.0,46.0,10,99999,0.1400\n";

    const VIX: &str = "Date,Open,High,Low,Close,Adj Close\n\
        42227,13.6,14.2,13.1,13.61,13.61\n\
        42228,14.1,15.0,13.5,13.61,13.61\n\
        42229,13.8,14.0,13.2,13.49,13.49\n";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 8, 12).unwrap()
    }

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_serial_dates() {
        assert_eq!(serial_to_date(42228.0).unwrap(), date());
        assert_eq!(serial_to_date(42228.75).unwrap(), date());
        assert!(serial_to_date(-1.0).is_err());
    }

    #[test]
    fn test_rate_curve_for_one_date() {
        let dir = tempfile::tempdir().unwrap();
        let curve = load_rate_curve(&write(&dir, "curve.csv", CURVE), date()).unwrap();
        assert_eq!(curve.domain(), (9.0, 365.0));
        assert!((curve.rate(37.0).unwrap() - 0.002523).abs() < 1e-15);
        let other = NaiveDate::from_ymd_opt(2015, 8, 13).unwrap();
        assert!(matches!(
            load_rate_curve(&write(&dir, "curve.csv", CURVE), other),
            Err(EngineError::MissingData(_))
        ));
    }

    #[test]
    fn test_dividend_yield() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "div.csv", DIVIDENDS);
        assert!((load_dividend_yield(&path, date()).unwrap() - 0.019372).abs() < 1e-15);
        let missing = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        assert!(matches!(load_dividend_yield(&path, missing), Err(EngineError::MissingData(_))));
    }

    #[test]
    fn test_series_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let series = SpotSeries::load(&write(&dir, "spx.csv", SERIES)).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series.adj_close_on(date()).unwrap(), 2086.05);

        // consecutive trading days, skipping the weekend
        let path = series.window(date(), 4).unwrap();
        assert_eq!(path, vec![2086.05, 2083.39, 2091.54, 2102.44]);
        assert!(matches!(series.window(date(), 5), Err(EngineError::MissingData(_))));

        let saturday = NaiveDate::from_ymd_opt(2015, 8, 15).unwrap();
        assert!(series.close_on(saturday).is_err());
        assert_eq!(series.adj_closes_through(date()).len(), 3);
        assert_eq!(series.adj_closes_between(date(), saturday).len(), 3);
    }

    #[test]
    fn test_quotes_best_by_open_interest() {
        let dir = tempfile::tempdir().unwrap();
        let quotes = OptionQuotes::load(&write(&dir, "q.csv", QUOTES), date()).unwrap();
        assert_eq!(quotes.len(), 4);

        let call = quotes.best_quote(2080.0, OptionType::Call).unwrap();
        assert_eq!(call.open_interest, 3000.0);
        assert!((call.mid() - 39.8).abs() < 1e-12);
        assert_eq!(call.implied_vol, 0.1521);

        // sentinel row dropped
        assert!(matches!(
            quotes.best_quote(2100.0, OptionType::Call),
            Err(EngineError::OutOfRange(_))
        ));
        assert_eq!(quotes.strikes(OptionType::Put), vec![2000.0, 2080.0]);
        assert_eq!(quotes.strikes(OptionType::Call), vec![2080.0]);
        assert!((quotes.mid_price(2000.0, OptionType::Put).unwrap() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_bad_rows_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = "Date,Days,Rate\n12/08/2015,nine,0.17\n";
        assert!(matches!(
            load_rate_curve(&write(&dir, "bad.csv", bad), date()),
            Err(EngineError::Parse(_))
        ));
        assert!(matches!(
            SpotSeries::load(&dir.path().join("absent.csv")),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn test_market_data_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "ZeroCurve.csv", CURVE);
        write(&dir, "SPXDivYield.csv", DIVIDENDS);
        write(&dir, "SPXDaily1950.csv", SERIES);
        write(&dir, "OptionData.csv", QUOTES);
        let cfg = AppConfig {
            data_dir: dir.path().to_path_buf(),
            rate_curve_file: "ZeroCurve.csv".into(),
            dividend_file: "SPXDivYield.csv".into(),
            underlying_file: "SPXDaily1950.csv".into(),
            option_quotes_file: "OptionData.csv".into(),
            vix_file: "VIXDaily.csv".into(),
            valuation_date: date(),
            transaction_cost_rate: 0.0005,
            iv_method: crate::models::implied_vol::IvMethod::NewtonRaphson,
            garch_horizon_days: 22,
            server_port: 0,
        };
        let md = MarketData::load(&cfg).unwrap();
        let m = md.market_state(37, 0.15).unwrap();
        assert_eq!(m.spot, 2086.05);
        assert!((m.risk_free_rate - 0.002523).abs() < 1e-15);
        assert!((m.dividend_yield - 0.019372).abs() < 1e-15);
        assert!(matches!(md.market_state(400, 0.15), Err(EngineError::OutOfRange(_))));

        // no VIX file in the directory
        assert!(md.vix.is_none());
        assert!(matches!(md.vix_pct(), Err(EngineError::MissingData(_))));

        write(&dir, "VIXDaily.csv", VIX);
        let md = MarketData::load(&cfg).unwrap();
        assert_eq!(md.vix_pct().unwrap(), 13.61);
    }

    #[test]
    fn test_hedge_window_uses_adjusted_closes() {
        let bar = |d: u32, close: f64, adj_close: f64| SpotBar {
            date: NaiveDate::from_ymd_opt(2015, 8, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            adj_close,
        };
        let series = SpotSeries::new(vec![bar(13, 101.0, 100.5), bar(12, 100.0, 99.5)]).unwrap();
        let path = series.window(date(), 2).unwrap();
        assert_eq!(path, vec![99.5, 100.5]);
        assert_eq!(path[0], series.adj_close_on(date()).unwrap());
    }
}
