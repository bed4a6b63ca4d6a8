//! Cash-flow forecast model
//!
//! Pure functions turning transaction history plus a current balance into a
//! multi-day balance projection with trend, seasonality, and confidence
//! bounds. This is a deliberate heuristic rather than a statistical
//! forecaster: downstream risk thresholds and nudge rules are calibrated
//! against this model's exact bucketing boundaries and formulas, so the
//! constants here must not be tuned in isolation.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Transaction, TransactionKind};
use crate::money::Money;

/// Trailing window used for daily income/expense rates
const RATE_WINDOW_DAYS: i64 = 60;
/// Trend detection looks at four 7-day buckets over the last 30 days
const TREND_BUCKETS: usize = 4;
const TREND_BUCKET_DAYS: i64 = 7;
/// Weekly net-flow change (in major units) that counts as a real trend
const TREND_THRESHOLD: Money = Money::from_major(50);

/// Direction of the recent net cash flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One projected day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub predicted: Money,
    pub upper_bound: Money,
    pub lower_bound: Money,
    /// Per-step confidence, decaying toward half the base over the horizon
    pub confidence: f64,
    /// 1-based offset from today
    pub day_offset: u32,
}

/// Average daily flow rates over the trailing window
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowRates {
    pub daily_income: Money,
    pub daily_expense: Money,
    pub daily_net: Money,
}

/// A complete balance projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowForecast {
    pub predictions: Vec<Prediction>,
    pub trend: Trend,
    /// Change in weekly net flow, most recent bucket vs. four weeks ago
    pub trend_rate: Money,
    /// Overall confidence 0-100, clamped to [20, 95]
    pub confidence: f64,
    pub rates: FlowRates,
}

impl CashFlowForecast {
    pub fn min_predicted(&self) -> Money {
        self.predictions
            .iter()
            .map(|p| p.predicted)
            .min()
            .unwrap_or(Money::ZERO)
    }

    pub fn max_predicted(&self) -> Money {
        self.predictions
            .iter()
            .map(|p| p.predicted)
            .max()
            .unwrap_or(Money::ZERO)
    }

    pub fn ending_predicted(&self) -> Money {
        self.predictions
            .last()
            .map(|p| p.predicted)
            .unwrap_or(Money::ZERO)
    }

    /// Dates whose projected balance falls below `threshold`
    pub fn critical_dates(&self, threshold: Money) -> Vec<NaiveDate> {
        self.predictions
            .iter()
            .filter(|p| p.predicted < threshold)
            .map(|p| p.date)
            .collect()
    }
}

/// Day-of-month expense seasonality, expressed in basis points against the
/// average expense transaction. 10_000 means "no adjustment".
#[derive(Debug, Clone, Copy)]
struct Seasonality {
    start_bp: i64,
    end_bp: i64,
}

impl Seasonality {
    const FLAT: Seasonality = Seasonality {
        start_bp: 10_000,
        end_bp: 10_000,
    };

    /// Multiplier applied on a projected day. Only the edges of the month
    /// get adjusted; mid-month days project at the flat daily rate.
    fn multiplier_bp(&self, day_of_month: u32) -> i64 {
        if day_of_month <= 10 {
            self.start_bp
        } else if day_of_month > 20 {
            self.end_bp
        } else {
            10_000
        }
    }
}

/// Project the balance forward `days` days from today.
///
/// `transactions` is the user's history, most-recent-first. Only the
/// trailing 60 days feed the flow rates; trend uses the last 30.
pub fn project(transactions: &[Transaction], current_balance: Money, days: u32) -> CashFlowForecast {
    project_from(transactions, current_balance, days, Utc::now().date_naive())
}

/// Deterministic variant of [`project`] used by tests and replays
pub fn project_from(
    transactions: &[Transaction],
    current_balance: Money,
    days: u32,
    today: NaiveDate,
) -> CashFlowForecast {
    let days = days.max(1);

    if transactions.is_empty() {
        return flat_forecast(current_balance, days, today);
    }

    let rates = flow_rates(transactions, today);
    let (trend, trend_rate) = detect_trend(transactions, today);
    let seasonality = expense_seasonality(transactions, today);
    let confidence = base_confidence(transactions, days, today);

    // Trend rate is weekly; spread it across the projected days.
    let daily_trend = trend_rate.div(7);
    let variance = (rates.daily_income - rates.daily_expense).abs().ratio(3, 10);

    let mut predictions = Vec::with_capacity(days as usize);
    let mut running = current_balance;

    for offset in 1..=days {
        let date = today + Duration::days(offset as i64);

        let income = (rates.daily_income + daily_trend).max(Money::ZERO);
        let expense = rates
            .daily_expense
            .ratio(seasonality.multiplier_bp(date.day()), 10_000);

        running = running + income - expense;

        let band = variance.ratio(offset as i64, 10);
        let step_confidence = confidence * (1.0 - 0.5 * offset as f64 / days as f64);

        predictions.push(Prediction {
            date,
            predicted: running,
            upper_bound: running + band,
            lower_bound: running - band,
            confidence: step_confidence,
            day_offset: offset,
        });
    }

    CashFlowForecast {
        predictions,
        trend,
        trend_rate,
        confidence,
        rates,
    }
}

/// Flat projection for users with no history
fn flat_forecast(current_balance: Money, days: u32, today: NaiveDate) -> CashFlowForecast {
    let predictions = (1..=days)
        .map(|offset| Prediction {
            date: today + Duration::days(offset as i64),
            predicted: current_balance,
            upper_bound: current_balance,
            lower_bound: current_balance,
            confidence: 20.0,
            day_offset: offset,
        })
        .collect();

    CashFlowForecast {
        predictions,
        trend: Trend::Stable,
        trend_rate: Money::ZERO,
        confidence: 20.0,
        rates: FlowRates {
            daily_income: Money::ZERO,
            daily_expense: Money::ZERO,
            daily_net: Money::ZERO,
        },
    }
}

/// Rolling 60-day averages. Missing days are implicitly zero-filled since
/// the sum is divided by the full window length.
fn flow_rates(transactions: &[Transaction], today: NaiveDate) -> FlowRates {
    let cutoff = today - Duration::days(RATE_WINDOW_DAYS);

    let mut income = Money::ZERO;
    let mut expense = Money::ZERO;
    for tx in transactions {
        let date = tx.date.date_naive();
        if date < cutoff || date > today {
            continue;
        }
        match tx.kind {
            TransactionKind::Income => income += tx.amount,
            TransactionKind::Expense => expense += tx.amount,
        }
    }

    let daily_income = income.div(RATE_WINDOW_DAYS);
    let daily_expense = expense.div(RATE_WINDOW_DAYS);
    FlowRates {
        daily_income,
        daily_expense,
        daily_net: daily_income - daily_expense,
    }
}

/// Partition the last 30 days into four 7-day buckets and compare the net
/// flow of the newest bucket against the oldest. Bucket 0 is most recent.
fn detect_trend(transactions: &[Transaction], today: NaiveDate) -> (Trend, Money) {
    let mut buckets = [Money::ZERO; TREND_BUCKETS];

    for tx in transactions {
        let date = tx.date.date_naive();
        if date > today {
            continue;
        }
        let age = (today - date).num_days();
        let bucket = age / TREND_BUCKET_DAYS;
        if !(0..TREND_BUCKETS as i64).contains(&bucket) {
            continue;
        }
        let signed = match tx.kind {
            TransactionKind::Income => tx.amount,
            TransactionKind::Expense => -tx.amount,
        };
        buckets[bucket as usize] += signed;
    }

    let rate = (buckets[0] - buckets[TREND_BUCKETS - 1]).div(TREND_BUCKETS as i64);

    let trend = if rate > TREND_THRESHOLD {
        Trend::Improving
    } else if rate < -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    };

    (trend, rate)
}

/// Bucket expense transactions by day-of-month: start (<=10), mid (11-20),
/// end (>20). Each edge bucket's average transaction amount, relative to
/// the overall average, becomes a multiplicative adjustment when the
/// projection crosses matching days.
fn expense_seasonality(transactions: &[Transaction], today: NaiveDate) -> Seasonality {
    let cutoff = today - Duration::days(RATE_WINDOW_DAYS);

    let mut sums = [Money::ZERO; 3];
    let mut counts = [0i64; 3];
    for tx in transactions {
        if tx.kind != TransactionKind::Expense {
            continue;
        }
        let date = tx.date.date_naive();
        if date < cutoff || date > today {
            continue;
        }
        let bucket = match date.day() {
            d if d <= 10 => 0,
            d if d <= 20 => 1,
            _ => 2,
        };
        sums[bucket] += tx.amount;
        counts[bucket] += 1;
    }

    let total: Money = sums.iter().copied().sum();
    let count: i64 = counts.iter().sum();
    if count == 0 || total.is_zero() {
        // No expense history: the multiplier must degrade to 1
        return Seasonality::FLAT;
    }
    let overall_avg = total.div(count);
    if overall_avg.is_zero() {
        return Seasonality::FLAT;
    }

    let bucket_bp = |i: usize| -> i64 {
        if counts[i] == 0 {
            return 10_000;
        }
        let avg = sums[i].div(counts[i]);
        (avg.minor() as i128 * 10_000 / overall_avg.minor() as i128) as i64
    };

    Seasonality {
        start_bp: bucket_bp(0),
        end_bp: bucket_bp(2),
    }
}

/// Base confidence: grows with data volume, shrinks with horizon length,
/// adjusted for how fresh the history is. Clamped to [20, 95].
fn base_confidence(transactions: &[Transaction], days: u32, today: NaiveDate) -> f64 {
    let n = transactions.len() as f64;
    let mut confidence = (n / 50.0).min(1.0) * 100.0;

    confidence *= (1.0 - days as f64 / 60.0).max(0.0);

    if let Some(newest) = transactions.iter().map(|t| t.date.date_naive()).max() {
        let age = (today - newest).num_days();
        if age <= 7 {
            confidence *= 1.10;
        } else if age > 30 {
            confidence *= 0.80;
        }
    }

    confidence.clamp(20.0, 95.0)
}
