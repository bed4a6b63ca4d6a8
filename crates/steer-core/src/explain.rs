//! Explainability service
//!
//! Read-side reconstruction of why a nudge, allowance, or risk value
//! came out the way it did. The narrative backend, when configured,
//! replaces only the `detailed` prose; everything else is computed
//! deterministically so the fallback path is always complete.
//!
//! The risk narrative here intentionally uses different factors and
//! cutoffs than the scorer in `risk`: one is calibrated against the
//! forecast model's scale, the other reads naturally to a user. Do not
//! unify them.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::forecast::{self, Trend};
use crate::models::{NudgeAction, RiskLevel, TransactionKind};
use crate::money::Money;
use crate::narrative::{NarrativeBackend, NarrativeClient};
use crate::nudge::NudgeType;
use crate::risk;

/// Reserve kept untouchable by the allowance formula
const ALLOWANCE_RESERVE_FLOOR: Money = Money::from_major(1000);
/// Fallback pay gap when no income cadence is known
const DEFAULT_INCOME_GAP_DAYS: i64 = 30;

/// Full explanation for one nudge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    pub detailed: String,
    pub key_factors: Vec<String>,
    /// 0-100, inherited from the forecast model's confidence
    pub confidence: f64,
    pub alternatives: Vec<String>,
    /// What happens if the nudge is ignored; type-aware phrasing
    pub counterfactual: String,
}

/// Breakdown of the daily spending allowance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowanceExplanation {
    pub daily_allowance: Money,
    pub balance: Money,
    pub reserve: Money,
    pub upcoming_bills: Money,
    pub days_until_income: i64,
    pub narrative: String,
}

/// One additive factor in the narrative risk view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub description: String,
    pub points: i64,
}

/// User-facing risk narrative, distinct from the scorer's assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskExplanation {
    pub score: i64,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub narrative: String,
}

/// Current financial context recomputed for every explanation
struct ExplainContext {
    balance: Money,
    upcoming_bills: Money,
    daily_allowance: Money,
    risk_level: RiskLevel,
    trend: Trend,
    confidence: f64,
}

pub struct ExplainabilityService {
    db: Database,
    narrative: Option<NarrativeClient>,
}

impl ExplainabilityService {
    pub fn new(db: Database, narrative: Option<NarrativeClient>) -> Self {
        Self { db, narrative }
    }

    /// Reconstruct why a nudge was produced
    pub async fn explain_nudge(&self, user_id: i64, nudge_id: i64) -> Result<Explanation> {
        let nudge = self
            .db
            .get_nudge(user_id, nudge_id)?
            .ok_or_else(|| Error::NotFound(format!("nudge {}", nudge_id)))?;
        let ctx = self.gather(user_id)?;

        let key_factors = key_factors(&nudge, &ctx);
        let summary = format!(
            "This {} suggestion came from your current balance of {} and a {} risk outlook.",
            nudge.nudge_type, ctx.balance, ctx.risk_level
        );
        let counterfactual = counterfactual(&nudge, &ctx);
        let alternatives = alternatives(&nudge);

        let fallback = format!(
            "{} {} {}",
            summary,
            nudge.reason,
            key_factors.join(" ")
        );
        let detailed = self.narrate(&nudge, &ctx, &fallback).await;

        Ok(Explanation {
            summary,
            detailed,
            key_factors,
            confidence: ctx.confidence,
            alternatives,
            counterfactual,
        })
    }

    /// Daily allowance breakdown:
    /// (balance − reserve − 7-day upcoming bills) / days until income
    pub fn explain_spending_allowance(&self, user_id: i64) -> Result<AllowanceExplanation> {
        let balance = self.db.total_balance(user_id)?;
        let reserve = balance.percent(10).max(ALLOWANCE_RESERVE_FLOOR);
        let upcoming_bills = self.upcoming_bills_total(user_id)?;
        let days_until_income = self.days_until_income(user_id)?;

        let spendable = (balance - reserve - upcoming_bills).max(Money::ZERO);
        let daily_allowance = spendable.div(days_until_income.max(1));

        let narrative = format!(
            "Of your {} balance, {} stays reserved and {} is earmarked for bills due this week. \
             The remaining {} spread over {} days until your next income gives {} per day.",
            balance, reserve, upcoming_bills, spendable, days_until_income, daily_allowance
        );

        Ok(AllowanceExplanation {
            daily_allowance,
            balance,
            reserve,
            upcoming_bills,
            days_until_income,
            narrative,
        })
    }

    /// Narrative risk view. Additive factors with cutoffs chosen for
    /// readability, not the scorer's thresholds.
    pub fn explain_risk_score(&self, user_id: i64) -> Result<RiskExplanation> {
        let balance = self.db.total_balance(user_id)?;
        let transactions = self.db.list_recent_transactions(user_id, 100)?;
        let today = Utc::now().date_naive();

        let mut factors = Vec::new();

        if balance < Money::from_major(500) {
            factors.push(RiskFactor {
                description: format!("Balance {} leaves almost no slack", balance),
                points: 35,
            });
        } else if balance < Money::from_major(1500) {
            factors.push(RiskFactor {
                description: format!("Balance {} is on the thin side", balance),
                points: 20,
            });
        }

        let forecast = forecast::project_from(&transactions, balance, 30, today);
        if forecast.trend == Trend::Declining {
            factors.push(RiskFactor {
                description: "Net cash flow has been declining over the last month".into(),
                points: 20,
            });
        }

        let emi = risk::check_emi_at_risk_from(&transactions, balance, today);
        if emi.at_risk {
            factors.push(RiskFactor {
                description: format!(
                    "Payments totalling {} land this week against a projected low of {}",
                    emi.total_emi, emi.min_predicted
                ),
                points: 25,
            });
        }

        let two_weeks_ago = Utc::now() - Duration::days(14);
        let recent_income = transactions
            .iter()
            .any(|tx| tx.kind == TransactionKind::Income && tx.date >= two_weeks_ago);
        if !recent_income {
            factors.push(RiskFactor {
                description: "No income recorded in the last two weeks".into(),
                points: 20,
            });
        }

        let score: i64 = factors.iter().map(|f| f.points).sum::<i64>().min(100);
        let level = if score <= 25 {
            RiskLevel::Safe
        } else if score <= 60 {
            RiskLevel::Caution
        } else {
            RiskLevel::Danger
        };

        let narrative = if factors.is_empty() {
            "Nothing in your recent activity stands out as risky.".to_string()
        } else {
            factors
                .iter()
                .map(|f| f.description.clone())
                .collect::<Vec<_>>()
                .join(" ")
        };

        Ok(RiskExplanation {
            score,
            level,
            factors,
            narrative,
        })
    }

    fn gather(&self, user_id: i64) -> Result<ExplainContext> {
        let balance = self.db.total_balance(user_id)?;
        let transactions = self.db.list_recent_transactions(user_id, 100)?;
        let today = Utc::now().date_naive();

        let forecast = forecast::project_from(&transactions, balance, 30, today);
        let assessment = risk::score_forecast(&forecast, balance);
        let upcoming_bills = self.upcoming_bills_total(user_id)?;
        let allowance = self.explain_spending_allowance(user_id)?;

        Ok(ExplainContext {
            balance,
            upcoming_bills,
            daily_allowance: allowance.daily_allowance,
            risk_level: assessment.level,
            trend: forecast.trend,
            confidence: forecast.confidence,
        })
    }

    /// Ask the narrative backend for richer prose, falling back to the
    /// deterministic text on any failure
    async fn narrate(&self, nudge: &NudgeAction, ctx: &ExplainContext, fallback: &str) -> String {
        let Some(client) = &self.narrative else {
            return fallback.to_string();
        };

        let prompt = format!(
            "In two sentences, explain to the user why this financial suggestion makes sense.\n\
             Suggestion: {}\nReason: {}\nBalance: {}\nBills due this week: {}\nRisk: {}",
            nudge.message, nudge.reason, ctx.balance, ctx.upcoming_bills, ctx.risk_level
        );

        match client.complete(&prompt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => fallback.to_string(),
            Err(e) => {
                debug!(error = %e, "narrative backend unavailable, using fallback");
                fallback.to_string()
            }
        }
    }

    /// Sum of obligations due within 7 days, across tracked bills and
    /// recurring expense templates
    fn upcoming_bills_total(&self, user_id: i64) -> Result<Money> {
        let bills: Money = self
            .db
            .bills_due_within(user_id, 7)?
            .iter()
            .map(|b| b.amount)
            .sum();
        let recurring: Money = self
            .db
            .upcoming_recurring_expenses(user_id, 7)?
            .iter()
            .map(|tx| tx.amount)
            .sum();

        Ok(bills + recurring)
    }

    /// Days until the next expected income: the nearest recurring
    /// income date when known, otherwise the rhythm cadence, otherwise
    /// a monthly default.
    fn days_until_income(&self, user_id: i64) -> Result<i64> {
        let today = Utc::now().date_naive();
        let transactions = self.db.list_recent_transactions(user_id, 100)?;

        let next_income = transactions
            .iter()
            .filter(|tx| tx.kind == TransactionKind::Income && tx.is_recurring)
            .filter_map(|tx| tx.next_recurring_date)
            .filter(|d| *d >= today)
            .min();
        if let Some(date) = next_income {
            return Ok((date - today).num_days().max(1));
        }

        let profile = self.db.get_profile(user_id)?;
        if let Some(rhythm) = &profile.income_rhythm {
            return Ok(rhythm.cadence.typical_gap_days());
        }

        Ok(DEFAULT_INCOME_GAP_DAYS)
    }
}

fn key_factors(nudge: &NudgeAction, ctx: &ExplainContext) -> Vec<String> {
    let mut factors = vec![
        format!("Current balance: {}", ctx.balance),
        format!("Bills due within 7 days: {}", ctx.upcoming_bills),
        format!("Daily spending allowance: {}", ctx.daily_allowance),
        format!("Risk outlook: {}", ctx.risk_level),
    ];
    if let Some(amount) = nudge.amount {
        factors.push(format!("Suggested amount: {}", amount));
    }
    factors
}

/// Type-aware "what if you ignore this" phrasing, fully deterministic
fn counterfactual(nudge: &NudgeAction, ctx: &ExplainContext) -> String {
    let amount = nudge.amount.unwrap_or(Money::ZERO);

    match nudge.nudge_type {
        NudgeType::AutoSave | NudgeType::MicroSave | NudgeType::GoalBackstop => format!(
            "Skip it and {} stays spendable today, but your savings fall {} further behind \
             while the cash-flow trend is {}.",
            amount, amount, ctx.trend
        ),
        NudgeType::BillPay | NudgeType::BillGuard | NudgeType::GuardianAlert => format!(
            "Ignore it and the {} obligation still lands this week; with {} in bills already \
             queued you risk a late fee or an overdraft.",
            amount, ctx.upcoming_bills
        ),
        NudgeType::SpendingAlert | NudgeType::SpendingGuardrail => format!(
            "Keep spending at this pace and the category stays on track to overshoot; your \
             daily allowance is {} and the risk outlook is already {}.",
            ctx.daily_allowance, ctx.risk_level
        ),
        NudgeType::EmergencyBuffer => format!(
            "Without a top-up your balance stays at {}, below the safety floor — one surprise \
             expense away from going negative.",
            ctx.balance
        ),
        NudgeType::IncomeOpportunity => format!(
            "Left alone, this week's income gap of {} carries into your balance heading into \
             the next pay cycle.",
            amount
        ),
        NudgeType::Summary => "Each consolidated suggestion carries its own consequence; \
             dismissing the summary dismisses them all."
            .to_string(),
    }
}

fn alternatives(nudge: &NudgeAction) -> Vec<String> {
    match nudge.nudge_type {
        NudgeType::AutoSave | NudgeType::MicroSave | NudgeType::GoalBackstop => vec![
            "Save a smaller amount now and revisit after the next paycheck".into(),
            "Set up a recurring transfer instead of one-off saves".into(),
        ],
        NudgeType::BillPay | NudgeType::BillGuard => vec![
            "Schedule the payment for the due date instead of paying early".into(),
            "Ring-fence the amount without paying yet".into(),
        ],
        NudgeType::GuardianAlert | NudgeType::EmergencyBuffer => vec![
            "Pause discretionary spending until the next income lands".into(),
            "Move funds from another account to cover the gap".into(),
        ],
        _ => vec!["Dismiss and keep monitoring".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountKind, NewNudge, NewTransaction};

    fn setup(balance: Money) -> (Database, ExplainabilityService) {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, balance, true)
            .unwrap();
        let service = ExplainabilityService::new(db.clone(), Some(NarrativeClient::mock()));
        (db, service)
    }

    #[test]
    fn test_allowance_formula() {
        // balance 20000, reserve max(2000, 1000) = 2000, no bills,
        // default 30-day gap => (20000-2000)/30 = 600/day
        let (_, service) = setup(Money::from_major(20_000));
        let allowance = service.explain_spending_allowance(1).unwrap();

        assert_eq!(allowance.reserve, Money::from_major(2000));
        assert_eq!(allowance.upcoming_bills, Money::ZERO);
        assert_eq!(allowance.days_until_income, 30);
        assert_eq!(allowance.daily_allowance, Money::from_major(600));
    }

    #[test]
    fn test_allowance_clamps_at_zero() {
        let (db, service) = setup(Money::from_major(1200));
        let due = Utc::now().date_naive() + Duration::days(2);
        db.create_bill(1, "Rent", Money::from_major(900), 1, due, false, "housing")
            .unwrap();

        // 1200 - 1000 reserve - 900 bills < 0 => allowance 0
        let allowance = service.explain_spending_allowance(1).unwrap();
        assert_eq!(allowance.daily_allowance, Money::ZERO);
    }

    #[test]
    fn test_allowance_uses_next_recurring_income_date() {
        let (db, service) = setup(Money::from_major(10_000));
        db.record_transaction(
            1,
            &NewTransaction {
                account_id: 1,
                kind: TransactionKind::Income,
                amount: Money::from_major(3000),
                category: "salary".into(),
                description: "salary".into(),
                date: Utc::now() - Duration::days(20),
                is_recurring: true,
                recurring_interval: Some(crate::models::RecurringInterval::Monthly),
                next_recurring_date: Some(Utc::now().date_naive() + Duration::days(10)),
            },
        )
        .unwrap();

        let allowance = service.explain_spending_allowance(1).unwrap();
        assert_eq!(allowance.days_until_income, 10);
    }

    #[test]
    fn test_risk_narrative_uses_its_own_cutoffs() {
        let (_, service) = setup(Money::from_major(400));
        let explanation = service.explain_risk_score(1).unwrap();

        // Thin balance (35) + no recent income (20) = 55 => Caution
        // under the narrative cutoffs, though the balance alone would
        // already alarm the scorer
        assert_eq!(explanation.score, 55);
        assert_eq!(explanation.level, RiskLevel::Caution);
        assert_eq!(explanation.factors.len(), 2);
    }

    #[tokio::test]
    async fn test_explain_nudge_has_counterfactual_without_backend() {
        let (db, _) = setup(Money::from_major(800));
        // No narrative client at all: the fallback path must still
        // produce a complete explanation
        let service = ExplainabilityService::new(db.clone(), None);

        let nudge = db
            .upsert_nudge(
                &NewNudge::new(
                    1,
                    NudgeType::EmergencyBuffer,
                    "top up",
                    "balance under floor",
                    10,
                    Utc::now() + Duration::hours(12),
                )
                .with_amount(Money::from_major(200)),
            )
            .unwrap();

        let explanation = service.explain_nudge(1, nudge.id).await.unwrap();
        assert!(!explanation.summary.is_empty());
        assert!(!explanation.detailed.is_empty());
        assert!(explanation.counterfactual.contains("safety floor"));
        assert!(!explanation.key_factors.is_empty());
        assert!(!explanation.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_explain_missing_nudge_is_not_found() {
        let (_, service) = setup(Money::from_major(800));
        let err = service.explain_nudge(1, 999).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
