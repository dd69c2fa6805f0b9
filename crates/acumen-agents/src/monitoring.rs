//! Cashflow monitoring: descriptive metrics, the Financial Health Index, and
//! rule-plus-statistics risk detection over normalized transactions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use acumen_types::{RiskFactor, Severity, Transaction, TransactionKind};

use crate::stats::{mean, percentile, sample_std};

// ---------------------------------------------------------------------------
// CashflowMetrics
// ---------------------------------------------------------------------------

/// Financial metrics computed over a window of transactions. Volatility and
/// consistency are derived from per-day aggregates, not individual rows, so
/// transaction granularity does not skew them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowMetrics {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cashflow: f64,
    /// Sample standard deviation of daily net cashflow.
    pub cashflow_volatility: f64,
    /// Volatility relative to the mean daily net cashflow; 0 when the mean is 0.
    pub cashflow_coefficient_of_variation: f64,
    /// 1 minus the (capped) coefficient of variation of daily income, in [0, 1].
    pub revenue_consistency: f64,
    /// Expenses over income; 1 when there is no income.
    pub expense_ratio: f64,
    pub num_transactions: u64,
    pub num_income_transactions: u64,
    pub num_expense_transactions: u64,
    pub average_daily_cashflow: f64,
    /// Number of distinct dates with at least one transaction.
    pub period_days: u64,
}

/// Compute metrics for a transaction window. Returns `None` when the window
/// is empty; callers decide whether that is an error.
pub fn compute_metrics(transactions: &[Transaction]) -> Option<CashflowMetrics> {
    if transactions.is_empty() {
        return None;
    }

    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut num_income = 0u64;
    let mut num_expenses = 0u64;
    let mut daily_net: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut daily_income: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for tx in transactions {
        match tx.kind {
            TransactionKind::Income => {
                total_income += tx.amount;
                num_income += 1;
                *daily_income.entry(tx.date).or_insert(0.0) += tx.amount;
            }
            TransactionKind::Expense => {
                total_expenses += tx.amount;
                num_expenses += 1;
            }
        }
        *daily_net.entry(tx.date).or_insert(0.0) += tx.signed_amount();
    }

    let net_cashflow = total_income - total_expenses;

    let daily_values: Vec<f64> = daily_net.values().copied().collect();
    let cashflow_volatility = sample_std(&daily_values);
    let cashflow_mean = mean(&daily_values);
    let cashflow_cv = if cashflow_mean != 0.0 {
        cashflow_volatility / cashflow_mean
    } else {
        0.0
    };

    let income_values: Vec<f64> = daily_income.values().copied().collect();
    let income_mean = mean(&income_values);
    let income_cv = if income_mean != 0.0 {
        sample_std(&income_values) / income_mean
    } else {
        1.0
    };
    let revenue_consistency = 1.0 - income_cv.min(1.0);

    let expense_ratio = if total_income != 0.0 {
        total_expenses / total_income
    } else {
        1.0
    };

    Some(CashflowMetrics {
        total_income,
        total_expenses,
        net_cashflow,
        cashflow_volatility,
        cashflow_coefficient_of_variation: cashflow_cv,
        revenue_consistency,
        expense_ratio,
        num_transactions: transactions.len() as u64,
        num_income_transactions: num_income,
        num_expense_transactions: num_expenses,
        average_daily_cashflow: cashflow_mean,
        period_days: daily_values.len() as u64,
    })
}

// ---------------------------------------------------------------------------
// Financial Health Index
// ---------------------------------------------------------------------------

/// Financial Health Index on a 0-100 scale. Starts from 100 and deducts for
/// expense pressure, negative cashflow, and volatility, then credits revenue
/// consistency.
pub fn financial_health_index(metrics: &CashflowMetrics) -> f64 {
    let mut score = 100.0;

    if metrics.expense_ratio > 0.9 {
        score -= 20.0;
    } else if metrics.expense_ratio > 0.8 {
        score -= 10.0;
    }

    if metrics.net_cashflow < 0.0 {
        score -= 30.0;
    }

    if metrics.cashflow_coefficient_of_variation > 0.5 {
        score -= 15.0;
    } else if metrics.cashflow_coefficient_of_variation > 0.3 {
        score -= 8.0;
    }

    score += metrics.revenue_consistency * 10.0;

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Risk detection
// ---------------------------------------------------------------------------

/// Threshold-based risk flags plus IQR outlier detection on raw amounts.
/// Outlier detection only runs once there are more than ten transactions.
pub fn detect_risks(metrics: &CashflowMetrics, transactions: &[Transaction]) -> Vec<RiskFactor> {
    let mut flags = Vec::new();

    if metrics.net_cashflow < 0.0 {
        flags.push(RiskFactor::new(
            "negative_cashflow",
            Severity::High,
            format!("Negative cashflow detected: {:.2}", metrics.net_cashflow),
        ));
    }

    if metrics.expense_ratio > 0.9 {
        flags.push(RiskFactor::new(
            "high_expense_ratio",
            Severity::Medium,
            format!("Expense ratio is {:.2}%", metrics.expense_ratio * 100.0),
        ));
    }

    if metrics.cashflow_coefficient_of_variation > 0.5 {
        flags.push(RiskFactor::new(
            "high_volatility",
            Severity::Medium,
            format!(
                "Cashflow volatility is high (CV: {:.2})",
                metrics.cashflow_coefficient_of_variation
            ),
        ));
    }

    if transactions.len() > 10 {
        let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();
        let q1 = percentile(&amounts, 25.0);
        let q3 = percentile(&amounts, 75.0);
        let iqr = q3 - q1;
        let lower = q1 - 1.5 * iqr;
        let upper = q3 + 1.5 * iqr;
        let outliers = amounts.iter().filter(|a| **a < lower || **a > upper).count();
        if outliers > 0 {
            flags.push(RiskFactor::new(
                "anomaly",
                Severity::Low,
                format!("Detected {outliers} anomalous transactions"),
            ));
        }
    }

    flags
}
