//! CSV result writer implementing ReportPort.
//!
//! Writes into the output directory:
//! - `equity.csv`: the marked-to-market equity curve
//! - `trades.csv`: one row per closed trade
//! - `monthly_returns.csv`: compounded return per calendar month, in percent
//! - `failed_orders.csv`: only when the fill port rejected something

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Datelike;
use serde::Serialize;
use tracing::info;

use crate::domain::driver::RunResult;
use crate::domain::error::LivermoreError;
use crate::domain::portfolio::EquityPoint;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub return_pct: f64,
}

pub fn compute_monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyReturn> {
    let mut log_sums: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for window in equity_curve.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        let rate = if prev.equity > 0.0 {
            (curr.equity - prev.equity) / prev.equity
        } else {
            0.0
        };
        *log_sums
            .entry((curr.date.year(), curr.date.month()))
            .or_default() += (1.0 + rate).ln();
    }

    log_sums
        .into_iter()
        .map(|((year, month), log_sum)| MonthlyReturn {
            year,
            month,
            return_pct: (log_sum.exp() - 1.0) * 100.0,
        })
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), LivermoreError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &RunResult, output_dir: &Path) -> Result<(), LivermoreError> {
        fs::create_dir_all(output_dir)?;
        let portfolio = &result.portfolio;

        write_rows(&output_dir.join("equity.csv"), &portfolio.equity_curve)?;
        write_rows(&output_dir.join("trades.csv"), &portfolio.trades)?;
        write_rows(
            &output_dir.join("monthly_returns.csv"),
            &compute_monthly_returns(&portfolio.equity_curve),
        )?;
        if !result.failed_orders.is_empty() {
            write_rows(&output_dir.join("failed_orders.csv"), &result.failed_orders)?;
        }

        info!(
            dir = %output_dir.display(),
            trades = portfolio.trades.len(),
            points = portfolio.equity_curve.len(),
            "report written"
        );
        Ok(())
    }
}
