//! Risk scoring
//!
//! Converts a balance forecast into a bounded 0-100 score and a three-tier
//! meter. The thresholds here are calibrated against the forecast model's
//! scale; see `explain` for the separate user-facing narrative view, which
//! intentionally uses different cutoffs.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::{self, CashFlowForecast};
use crate::models::{RiskLevel, Transaction, TransactionKind};
use crate::money::Money;

/// Horizon for the EMI-at-risk specialization
const EMI_WINDOW_DAYS: i64 = 7;
/// Cushion kept above the projected minimum before EMIs count as covered
const EMI_CUSHION: Money = Money::from_major(1000);

impl RiskLevel {
    /// Map a 0-100 risk score onto the three-tier meter
    pub fn from_score(score: u8) -> RiskLevel {
        if score <= 30 {
            RiskLevel::Safe
        } else if score <= 70 {
            RiskLevel::Caution
        } else {
            RiskLevel::Danger
        }
    }
}

/// Result of a risk computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 (safest) to 100 (riskiest)
    pub score: u8,
    pub level: RiskLevel,
    /// Human-readable contributions, persisted into risk snapshots
    pub drivers: Vec<String>,
}

/// Score a forecast against the current balance
pub fn score_forecast(forecast: &CashFlowForecast, current_balance: Money) -> RiskAssessment {
    score_predictions(
        forecast.min_predicted(),
        forecast.max_predicted(),
        forecast.ending_predicted(),
        current_balance,
    )
}

/// Core scoring rule over the horizon's summary statistics.
///
/// The minimum-balance brackets are mutually exclusive: the highest
/// threshold met wins, so the chain must stay if/else-if rather than
/// cumulative.
pub fn score_predictions(
    min_predicted: Money,
    max_predicted: Money,
    ending_predicted: Money,
    current_balance: Money,
) -> RiskAssessment {
    let mut score: i64 = 0;
    let mut drivers = Vec::new();

    if min_predicted < Money::from_major(500) {
        score += 40;
        drivers.push(format!("Projected balance dips below 500 ({})", min_predicted));
    } else if min_predicted < Money::from_major(1000) {
        score += 25;
        drivers.push(format!("Projected balance dips below 1000 ({})", min_predicted));
    } else if min_predicted < Money::from_major(2000) {
        score += 10;
        drivers.push(format!("Projected balance dips below 2000 ({})", min_predicted));
    }

    // Spread over the horizon as a share of today's balance. A non-positive
    // balance makes any swing total, so treat it as maximal volatility.
    let volatility_pct = if current_balance.is_positive() {
        (max_predicted - min_predicted)
            .pct_of(current_balance)
            .unwrap_or(0)
    } else {
        100
    };
    if volatility_pct > 50 {
        score += 30;
        drivers.push(format!("High balance volatility ({}%)", volatility_pct));
    } else if volatility_pct > 30 {
        score += 15;
        drivers.push(format!("Elevated balance volatility ({}%)", volatility_pct));
    }

    if current_balance.is_positive() && ending_predicted < current_balance {
        let decline_pct = (current_balance - ending_predicted)
            .pct_of(current_balance)
            .unwrap_or(0);
        let contribution = decline_pct.min(30);
        if contribution > 0 {
            score += contribution;
            drivers.push(format!("Balance declining {}% over the horizon", decline_pct));
        }
    }

    let score = score.clamp(0, 100) as u8;
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        drivers,
    }
}

/// EMI-at-risk check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmiRisk {
    pub at_risk: bool,
    /// How much the cushion-adjusted minimum falls short of upcoming EMIs
    pub shortfall: Money,
    /// Sum of recurring expenses due within the window
    pub total_emi: Money,
    /// Minimum projected balance over the 7-day window
    pub min_predicted: Money,
    /// Earliest upcoming recurring expense, if any
    pub next_due: Option<NaiveDate>,
}

/// 7-day forecast plus upcoming-EMI comparison.
///
/// Flags risk when recurring expenses due within 7 days exceed the
/// projected minimum balance minus a 1000 cushion.
pub fn check_emi_at_risk(
    transactions: &[Transaction],
    current_balance: Money,
) -> EmiRisk {
    check_emi_at_risk_from(transactions, current_balance, Utc::now().date_naive())
}

/// Deterministic variant of [`check_emi_at_risk`]
pub fn check_emi_at_risk_from(
    transactions: &[Transaction],
    current_balance: Money,
    today: NaiveDate,
) -> EmiRisk {
    let forecast = forecast::project_from(transactions, current_balance, EMI_WINDOW_DAYS as u32, today);
    let min_predicted = forecast.min_predicted();

    let window_end = today + Duration::days(EMI_WINDOW_DAYS);
    let mut total_emi = Money::ZERO;
    let mut next_due: Option<NaiveDate> = None;
    for tx in transactions {
        if tx.kind != TransactionKind::Expense || !tx.is_recurring {
            continue;
        }
        let Some(due) = tx.next_recurring_date else {
            continue;
        };
        if due >= today && due <= window_end {
            total_emi += tx.amount;
            next_due = Some(next_due.map_or(due, |d: NaiveDate| d.min(due)));
        }
    }

    let cushion_floor = min_predicted - EMI_CUSHION;
    let at_risk = total_emi.is_positive() && total_emi > cushion_floor;
    let shortfall = (total_emi - cushion_floor).max(Money::ZERO);

    EmiRisk {
        at_risk,
        shortfall: if at_risk { shortfall } else { Money::ZERO },
        total_emi,
        min_predicted,
        next_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_meter_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(31), RiskLevel::Caution);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Caution);
        assert_eq!(RiskLevel::from_score(71), RiskLevel::Danger);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Danger);
    }

    #[test]
    fn test_compound_drivers_score_80_danger() {
        // min 400 (+40), volatility 60% (+30), decline 10% (+10) => 80
        let current = Money::from_major(10_000);
        let assessment = score_predictions(
            Money::from_major(400),
            Money::from_major(6400),
            Money::from_major(9000),
            current,
        );
        assert_eq!(assessment.score, 80);
        assert_eq!(assessment.level, RiskLevel::Danger);
        assert_eq!(assessment.drivers.len(), 3);
    }

    #[test]
    fn test_min_balance_brackets_are_exclusive() {
        let current = Money::from_major(10_000);
        let flat = |min: i64| {
            score_predictions(
                Money::from_major(min),
                Money::from_major(min),
                current,
                current,
            )
            .score
        };
        assert_eq!(flat(400), 40);
        assert_eq!(flat(800), 25);
        assert_eq!(flat(1500), 10);
        assert_eq!(flat(2500), 0);
    }

    #[test]
    fn test_decline_contribution_is_capped() {
        let current = Money::from_major(10_000);
        // 90% decline, no dip below 2000 thresholds avoided by min=ending
        let assessment = score_predictions(
            Money::from_major(2500),
            Money::from_major(10_000),
            Money::from_major(2500),
            current,
        );
        // volatility 75% (+30) + decline capped at 30
        assert_eq!(assessment.score, 60);
    }

    #[test]
    fn test_risk_monotonic_in_min_and_ending() {
        let current = Money::from_major(5000);
        let base = score_predictions(
            Money::from_major(2500),
            Money::from_major(5000),
            Money::from_major(4000),
            current,
        );
        // Push the minimum lower: score must not decrease
        let lower_min = score_predictions(
            Money::from_major(900),
            Money::from_major(5000),
            Money::from_major(4000),
            current,
        );
        assert!(lower_min.score >= base.score);

        // Push the ending balance lower: score must not decrease
        let lower_end = score_predictions(
            Money::from_major(900),
            Money::from_major(5000),
            Money::from_major(900),
            current,
        );
        assert!(lower_end.score >= lower_min.score);
    }

    #[test]
    fn test_emi_at_risk_shortfall() {
        // A 1500 balance against 2000 of EMIs due this week is short by
        // at least 500 once the 1000 cushion is held back.
        let today = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();
        let due = today + Duration::days(3);
        let emi = Transaction {
            id: 1,
            user_id: 1,
            account_id: 1,
            kind: TransactionKind::Expense,
            amount: Money::from_major(2000),
            category: "emi".into(),
            description: "car loan".into(),
            date: Utc
                .with_ymd_and_hms(today.year(), today.month(), 1, 9, 0, 0)
                .unwrap(),
            is_recurring: true,
            recurring_interval: Some(crate::models::RecurringInterval::Monthly),
            next_recurring_date: Some(due),
            created_at: Utc::now(),
        };

        // A single old expense keeps history non-empty without moving the
        // projection far from the current balance.
        let result = check_emi_at_risk_from(&[emi], Money::from_major(1500), today);

        assert!(result.at_risk);
        assert_eq!(result.total_emi, Money::from_major(2000));
        assert!(result.shortfall >= Money::from_major(500));
        assert_eq!(result.next_due, Some(due));
    }

    #[test]
    fn test_emi_not_at_risk_with_cushion() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();
        let result = check_emi_at_risk_from(&[], Money::from_major(10_000), today);
        assert!(!result.at_risk);
        assert_eq!(result.shortfall, Money::ZERO);
        assert_eq!(result.total_emi, Money::ZERO);
    }
}
