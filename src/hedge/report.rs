//! Hedge simulation output.
//! Built once by the simulator, read-only afterwards.

use crate::errors::EngineResult;

/// Portfolio snapshot at the close of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HedgeDay {
    pub day: u32,
    pub days_remaining: u32,
    pub spot: f64,
    pub delta: f64,
    /// delta * spot after rebalancing (before liquidation on the final day)
    pub stock_holding_value: f64,
    /// Cash paid for the day's trade; negative when stock is sold
    pub cash_flow_from_trade: f64,
    pub transaction_cost: f64,
    pub bank_balance: f64,
    pub cumulative_pnl: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HedgeReport {
    pub days: Vec<HedgeDay>,
    pub premium: f64,
    /// Annualized decimal volatility used for every delta on the path
    pub volatility_used: f64,
    pub total_transaction_costs: f64,
    pub terminal_pnl: f64,
    /// Largest peak-to-trough fall of cumulative P&L along the path
    pub max_drawdown: f64,
}

impl HedgeReport {
    /// Summarize a completed day sequence. `days` must be non-empty.
    pub fn new(days: Vec<HedgeDay>, premium: f64, volatility_used: f64) -> Self {
        let total_transaction_costs = days.iter().map(|d| d.transaction_cost).sum();
        let terminal_pnl = days.last().map_or(0.0, |d| d.cumulative_pnl);
        let max_drawdown = max_drawdown(days.iter().map(|d| d.cumulative_pnl));
        Self {
            days,
            premium,
            volatility_used,
            total_transaction_costs,
            terminal_pnl,
            max_drawdown,
        }
    }

    /// Write the per-day table as CSV with a header row.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> EngineResult<()> {
        let mut w = csv::Writer::from_writer(writer);
        for day in &self.days {
            w.serialize(day)?;
        }
        w.flush()?;
        Ok(())
    }
}

fn max_drawdown(series: impl Iterator<Item = f64>) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for v in series {
        peak = peak.max(v);
        worst = worst.max(peak - v);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(day: u32, pnl: f64, cost: f64) -> HedgeDay {
        HedgeDay {
            day,
            days_remaining: 3 - day,
            spot: 100.0,
            delta: 0.5,
            stock_holding_value: 50.0,
            cash_flow_from_trade: 0.0,
            transaction_cost: cost,
            bank_balance: pnl - 50.0,
            cumulative_pnl: pnl,
        }
    }

    #[test]
    fn test_summary_totals() {
        let report = HedgeReport::new(
            vec![day(0, 1.0, 0.1), day(1, 2.5, 0.2), day(2, 0.5, 0.05), day(3, 1.5, 0.3)],
            1.0,
            0.2,
        );
        assert!((report.total_transaction_costs - 0.65).abs() < 1e-12);
        assert_eq!(report.terminal_pnl, 1.5);
        assert!((report.max_drawdown - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_csv_export() {
        let report = HedgeReport::new(vec![day(0, 1.0, 0.1), day(1, 0.5, 0.2)], 1.0, 0.2);
        let mut buf = Vec::new();
        report.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "day,days_remaining,spot,delta,stock_holding_value,cash_flow_from_trade,\
             transaction_cost,bank_balance,cumulative_pnl"
        );
        assert_eq!(lines.count(), 2);
    }
}
