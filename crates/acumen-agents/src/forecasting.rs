//! Cashflow forecasting: a trailing-moving-average projection of daily net
//! cashflow, stress scenarios over the projected total, and a liquidity risk
//! score.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use acumen_types::Transaction;

use crate::stats::{mean, sample_std};

/// Default forecast horizon in days.
pub const DEFAULT_HORIZON_DAYS: usize = 30;

// ---------------------------------------------------------------------------
// Forecast types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Negative,
    Positive,
}

impl Impact {
    fn of(net: f64) -> Self {
        if net < 0.0 {
            Impact::Negative
        } else {
            Impact::Positive
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub net_cashflow: f64,
    pub impact: Impact,
}

/// The three stress scenarios applied to the projected net cashflow: a 20%
/// revenue drop, a 30% expense increase, and both combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenarios {
    pub revenue_drop_20: StressScenario,
    pub expense_increase_30: StressScenario,
    pub combined_stress: StressScenario,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub total_predicted_inflow: f64,
    pub total_predicted_outflow: f64,
    pub predicted_net_cashflow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowForecast {
    pub points: Vec<ForecastPoint>,
    pub stress_scenarios: StressScenarios,
    /// 0-100, higher means tighter liquidity over the horizon.
    pub liquidity_risk_score: f64,
    pub summary: ForecastSummary,
}

// ---------------------------------------------------------------------------
// Forecasting
// ---------------------------------------------------------------------------

/// Forecast daily net cashflow over `horizon_days`.
///
/// History is aggregated to a daily series with gaps filled as zero. The
/// projection extends the trailing moving average by its last step, with a
/// 95% band from the standard deviation of the final window. The horizon
/// starts the day after the last observed date, so identical inputs always
/// produce identical forecasts.
///
/// Returns `None` when there are no transactions or the horizon is zero.
pub fn forecast_cashflow(
    transactions: &[Transaction],
    horizon_days: usize,
) -> Option<CashflowForecast> {
    if transactions.is_empty() || horizon_days == 0 {
        return None;
    }

    let series = daily_series(transactions);
    let last_date = series.last().map(|(d, _)| *d)?;
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

    let window = (values.len() / 2).clamp(1, 30);
    let ma = moving_average(&values, window);
    let last_ma = ma.last().copied().unwrap_or_else(|| mean(&values));
    let last_trend = if ma.len() >= 2 {
        ma[ma.len() - 1] - ma[ma.len() - 2]
    } else {
        0.0
    };
    let band = 1.96 * sample_std(&values[values.len() - window..]);

    let mut points = Vec::with_capacity(horizon_days);
    for i in 0..horizon_days {
        let predicted = last_ma + last_trend * i as f64;
        points.push(ForecastPoint {
            date: last_date + Days::new(1 + i as u64),
            predicted,
            lower: predicted - band,
            upper: predicted + band,
        });
    }

    let predicted_net: f64 = points.iter().map(|p| p.predicted).sum();
    let stress_scenarios = stress(predicted_net);
    let liquidity_risk_score = liquidity_risk(predicted_net, &stress_scenarios);

    let total_predicted_inflow: f64 = points
        .iter()
        .map(|p| p.predicted)
        .filter(|v| *v > 0.0)
        .sum();
    let total_predicted_outflow: f64 = points
        .iter()
        .map(|p| p.predicted)
        .filter(|v| *v < 0.0)
        .sum::<f64>()
        .abs();

    Some(CashflowForecast {
        points,
        stress_scenarios,
        liquidity_risk_score,
        summary: ForecastSummary {
            total_predicted_inflow,
            total_predicted_outflow,
            predicted_net_cashflow: predicted_net,
        },
    })
}

fn stress(predicted_net: f64) -> StressScenarios {
    let scenario = |net: f64| StressScenario {
        net_cashflow: net,
        impact: Impact::of(net),
    };
    StressScenarios {
        revenue_drop_20: scenario(predicted_net * 0.8),
        expense_increase_30: scenario(predicted_net * 0.7),
        combined_stress: scenario(predicted_net * 0.5),
    }
}

/// Liquidity risk over the horizon. A negative projection contributes up to
/// 100 directly; each scenario that goes negative adds a fixed penalty.
fn liquidity_risk(predicted_net: f64, scenarios: &StressScenarios) -> f64 {
    let mut risk: f64 = 0.0;

    if predicted_net < 0.0 {
        risk = (predicted_net.abs() / 1000.0 * 10.0).min(100.0);
    }

    if scenarios.combined_stress.impact == Impact::Negative {
        risk += 30.0;
    }
    if scenarios.revenue_drop_20.impact == Impact::Negative {
        risk += 15.0;
    }
    if scenarios.expense_increase_30.impact == Impact::Negative {
        risk += 15.0;
    }

    risk.clamp(0.0, 100.0)
}

/// Daily net cashflow between the first and last observed dates, with days
/// that have no transactions filled as zero.
fn daily_series(transactions: &[Transaction]) -> Vec<(NaiveDate, f64)> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tx in transactions {
        *by_date.entry(tx.date).or_insert(0.0) += tx.signed_amount();
    }

    let (first, last) = match (by_date.keys().next(), by_date.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut series = Vec::new();
    let mut day = first;
    loop {
        series.push((day, by_date.get(&day).copied().unwrap_or(0.0)));
        if day == last {
            break;
        }
        day = day + Days::new(1);
    }
    series
}

/// Trailing moving averages, one entry per full window.
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}
