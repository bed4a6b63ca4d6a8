//! On-demand nudge generation
//!
//! A rule engine over the user's current financial state. Every rule is
//! evaluated independently and several may fire in one run; the
//! post-processing pass consolidates, thresholds, caps, and ranks the
//! survivors, then stamps a shared risk context into each one's
//! metadata. The scheduled-agent rules (spending-guardrail,
//! goal-backstop) live in `agents`, not here.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::Database;
use crate::error::Result;
use crate::forecast::{self, CashFlowForecast, Trend};
use crate::models::{FinancialProfile, NewNudge, RiskLevel, Transaction};
use crate::money::Money;
use crate::nudge::NudgeType;
use crate::rhythm;
use crate::risk::{self, EmiRisk, RiskAssessment};

/// Floor below which the emergency-buffer rule fires
const EMERGENCY_FLOOR: Money = Money::from_major(1000);
/// Spare budget required before goal auto-save proposes anything
const GOAL_SAVE_MIN_REMAINDER: Money = Money::from_major(500);
/// Balance gate for the generic auto-save rule
const GENERIC_SAVE_BALANCE_GATE: Money = Money::from_major(20_000);
const GENERIC_SAVE_REMAINDER_GATE: Money = Money::from_major(5000);
const GENERIC_SAVE_CAP: Money = Money::from_major(2000);
/// Micro-save bounds around the safe-to-save estimate
const MICRO_SAVE_MIN: Money = Money::from_major(50);
const MICRO_SAVE_MAX: Money = Money::from_major(120);
/// Transactions fed into the rule evaluation
const HISTORY_LIMIT: u32 = 100;
/// Deeper window for the rhythm cache refresh, sized to the analyzer's
/// 120-day lookback
const RHYTHM_HISTORY_LIMIT: u32 = 500;

/// Shared risk context attached to every generated nudge's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContext {
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub trend: Trend,
    /// Payday weekday from the income rhythm cache, when known
    pub payday: Option<String>,
}

/// Everything the rules look at, gathered once per run
struct GeneratorContext {
    balance: Money,
    transactions: Vec<Transaction>,
    forecast: CashFlowForecast,
    assessment: RiskAssessment,
    week_risk: RiskAssessment,
    emi: EmiRisk,
    budget_remainder: Option<Money>,
    now: DateTime<Utc>,
}

pub struct NudgeGenerator {
    db: Database,
}

impl NudgeGenerator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Evaluate every on-demand rule and post-process the candidates
    pub fn generate(&self, user_id: i64) -> Result<Vec<NewNudge>> {
        self.generate_at(user_id, Utc::now())
    }

    pub fn generate_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<NewNudge>> {
        let profile = self.refresh_rhythm(user_id, now)?;
        let ctx = self.gather(user_id, now)?;

        let mut candidates = Vec::new();
        candidates.extend(self.rule_emergency_buffer(user_id, &ctx));
        candidates.extend(self.rule_goal_auto_save(user_id, &ctx)?);
        candidates.extend(self.rule_generic_auto_save(user_id, &ctx));
        candidates.extend(self.rule_micro_save(user_id, &ctx));
        candidates.extend(self.rule_bill_pay_and_guard(user_id, &ctx)?);
        candidates.extend(self.rule_guardian_alert(user_id, &ctx));
        candidates.extend(self.rule_spending_alert(user_id, &ctx)?);
        candidates.extend(self.rule_income_opportunity(user_id, &ctx));

        Ok(self.post_process(user_id, candidates, &profile, &ctx))
    }

    /// Recompute the rhythm cache, persist it into the profile, and
    /// hand back the re-read profile so downstream stages only ever see
    /// persisted state.
    fn refresh_rhythm(&self, user_id: i64, now: DateTime<Utc>) -> Result<FinancialProfile> {
        let history = self
            .db
            .list_recent_transactions(user_id, RHYTHM_HISTORY_LIMIT)?;
        let rhythm = rhythm::analyze_from(&history, now.date_naive());

        let mut profile = self.db.get_profile(user_id)?;
        profile.income_rhythm = rhythm.income_rhythm;
        profile.spend_rhythm = Some(rhythm.spend_rhythm);
        // Feedback-learned hours win over the derived default
        if profile.optimal_nudge_hour.is_none() {
            profile.optimal_nudge_hour = Some(rhythm.optimal_hour);
        }
        profile.last_personalization_update = Some(now);
        self.db.save_profile(&profile)?;

        self.db.get_profile(user_id)
    }

    fn gather(&self, user_id: i64, now: DateTime<Utc>) -> Result<GeneratorContext> {
        let balance = self.db.total_balance(user_id)?;
        let transactions = self.db.list_recent_transactions(user_id, HISTORY_LIMIT)?;
        let today = now.date_naive();

        let forecast = forecast::project_from(&transactions, balance, 30, today);
        let assessment = risk::score_forecast(&forecast, balance);
        let week_forecast = forecast::project_from(&transactions, balance, 7, today);
        let week_risk = risk::score_forecast(&week_forecast, balance);
        let emi = risk::check_emi_at_risk_from(&transactions, balance, today);

        let budget_remainder = match self.db.get_budget(user_id)? {
            Some(budget) => {
                let month_start = month_start(now);
                let spent = self.db.spend_between(user_id, month_start, now)?;
                Some((budget.amount - spent).max(Money::ZERO))
            }
            None => None,
        };

        Ok(GeneratorContext {
            balance,
            transactions,
            forecast,
            assessment,
            week_risk,
            emi,
            budget_remainder,
            now,
        })
    }

    /// Balance under the emergency floor is the highest-priority signal
    fn rule_emergency_buffer(&self, user_id: i64, ctx: &GeneratorContext) -> Option<NewNudge> {
        if !ctx.balance.is_positive() || ctx.balance >= EMERGENCY_FLOOR {
            return None;
        }

        let gap = EMERGENCY_FLOOR - ctx.balance;
        Some(
            NewNudge::new(
                user_id,
                NudgeType::EmergencyBuffer,
                format!(
                    "Your balance is down to {}. Top up {} to restore a {} emergency buffer.",
                    ctx.balance, gap, EMERGENCY_FLOOR
                ),
                format!("Total balance {} is below the {} floor", ctx.balance, EMERGENCY_FLOOR),
                10,
                ctx.now + NudgeType::EmergencyBuffer.default_ttl(),
            )
            .with_amount(gap),
        )
    }

    /// Save toward the nearest active goal when this month's budget has slack
    fn rule_goal_auto_save(&self, user_id: i64, ctx: &GeneratorContext) -> Result<Option<NewNudge>> {
        let Some(remainder) = ctx.budget_remainder else {
            return Ok(None);
        };
        if remainder <= GOAL_SAVE_MIN_REMAINDER {
            return Ok(None);
        }

        let goals = self.db.list_active_goals(user_id)?;
        let Some(goal) = goals.iter().find(|g| g.remaining().is_positive()) else {
            return Ok(None);
        };

        let amount = goal
            .remaining()
            .percent(5)
            .clamp(Money::from_major(500), Money::from_major(2000));

        Ok(Some(
            NewNudge::new(
                user_id,
                NudgeType::AutoSave,
                format!(
                    "Move {} toward \"{}\" — {} still to go and your budget has room.",
                    amount,
                    goal.name,
                    goal.remaining()
                ),
                format!(
                    "Budget remainder {} exceeds {} with an active goal behind target",
                    remainder, GOAL_SAVE_MIN_REMAINDER
                ),
                5,
                ctx.now + NudgeType::AutoSave.default_ttl(),
            )
            .with_amount(amount)
            .with_metadata(json!({ "goal_id": goal.id })),
        ))
    }

    /// Generic save when both balance and budget slack are comfortable
    fn rule_generic_auto_save(&self, user_id: i64, ctx: &GeneratorContext) -> Option<NewNudge> {
        let remainder = ctx.budget_remainder?;
        if ctx.balance <= GENERIC_SAVE_BALANCE_GATE || remainder <= GENERIC_SAVE_REMAINDER_GATE {
            return None;
        }

        let amount = remainder.percent(20).min(GENERIC_SAVE_CAP);
        Some(
            NewNudge::new(
                user_id,
                NudgeType::AutoSave,
                format!("You have room to set {} aside this month.", amount),
                format!("Balance {} and budget remainder {} both comfortably high", ctx.balance, remainder),
                3,
                ctx.now + NudgeType::AutoSave.default_ttl(),
            )
            .with_amount(amount),
        )
    }

    /// Small save sized by the safe-to-save estimate when the week ahead
    /// is risky
    fn rule_micro_save(&self, user_id: i64, ctx: &GeneratorContext) -> Option<NewNudge> {
        if ctx.week_risk.level == RiskLevel::Safe {
            return None;
        }

        let amount = safe_to_save(&ctx.forecast);
        Some(
            NewNudge::new(
                user_id,
                NudgeType::MicroSave,
                format!("Tuck away {} now, before the week gets tight.", amount),
                format!("7-day outlook is {} (score {})", ctx.week_risk.level, ctx.week_risk.score),
                6,
                ctx.now + NudgeType::MicroSave.default_ttl(),
            )
            .with_amount(amount),
        )
    }

    /// Earliest obligation due within a week: pay early, and separately
    /// ring-fence its amount. Tracked bills win over recurring expense
    /// templates because accepting their guard can place a real
    /// envelope.
    fn rule_bill_pay_and_guard(&self, user_id: i64, ctx: &GeneratorContext) -> Result<Vec<NewNudge>> {
        let today = ctx.now.date_naive();
        let window_end = today + Duration::days(7);

        if let Some(bill) = self.db.bills_due_within(user_id, 7)?.into_iter().next() {
            let due = bill.next_due_date;
            return Ok(vec![
                NewNudge::new(
                    user_id,
                    NudgeType::BillPay,
                    format!("{} ({}) is due {}. Pay it early and forget about it.", bill.name, bill.amount, due),
                    format!("Bill due within 7 days ({})", due),
                    5,
                    ctx.now + NudgeType::BillPay.default_ttl(),
                )
                .with_amount(bill.amount)
                .with_metadata(json!({ "bill_id": bill.id, "due_date": due })),
                NewNudge::new(
                    user_id,
                    NudgeType::BillGuard,
                    format!("Ring-fence {} for {} so it can't be spent before {}.", bill.amount, bill.name, due),
                    format!("Protects the {} due {}", bill.name, due),
                    6,
                    ctx.now + NudgeType::BillGuard.default_ttl(),
                )
                .with_amount(bill.amount)
                .with_metadata(json!({ "bill_id": bill.id, "due_date": due })),
            ]);
        }

        let next = ctx
            .transactions
            .iter()
            .filter(|tx| {
                tx.kind == crate::models::TransactionKind::Expense
                    && tx.is_recurring
                    && tx
                        .next_recurring_date
                        .is_some_and(|d| d >= today && d <= window_end)
            })
            .min_by_key(|tx| tx.next_recurring_date);

        let Some(bill) = next else {
            return Ok(Vec::new());
        };
        let due = match bill.next_recurring_date {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        Ok(vec![
            NewNudge::new(
                user_id,
                NudgeType::BillPay,
                format!("{} ({}) is due {}. Pay it early and forget about it.", bill.description, bill.amount, due),
                format!("Recurring expense due within 7 days ({})", due),
                5,
                ctx.now + NudgeType::BillPay.default_ttl(),
            )
            .with_amount(bill.amount)
            .with_metadata(json!({ "transaction_id": bill.id, "due_date": due })),
            NewNudge::new(
                user_id,
                NudgeType::BillGuard,
                format!("Ring-fence {} for {} so it can't be spent before {}.", bill.amount, bill.description, due),
                format!("Protects the {} due {}", bill.description, due),
                6,
                ctx.now + NudgeType::BillGuard.default_ttl(),
            )
            .with_amount(bill.amount)
            .with_metadata(json!({ "transaction_id": bill.id, "due_date": due })),
        ])
    }

    /// EMIs due soon exceed the projected cushion
    fn rule_guardian_alert(&self, user_id: i64, ctx: &GeneratorContext) -> Option<NewNudge> {
        if !ctx.emi.at_risk {
            return None;
        }

        let due_note = ctx
            .emi
            .next_due
            .map(|d| format!(" Next payment lands {}.", d))
            .unwrap_or_default();

        Some(
            NewNudge::new(
                user_id,
                NudgeType::GuardianAlert,
                format!(
                    "Upcoming payments total {} but your projected low is {}. \
                     Cover the {} gap: pause discretionary spend, shift a payment date, \
                     or move the shortfall from savings.{}",
                    ctx.emi.total_emi, ctx.emi.min_predicted, ctx.emi.shortfall, due_note
                ),
                format!(
                    "EMIs due within 7 days exceed the projected minimum minus the cushion by {}",
                    ctx.emi.shortfall
                ),
                8,
                ctx.now + NudgeType::GuardianAlert.default_ttl(),
            )
            .with_amount(ctx.emi.shortfall),
        )
    }

    /// Categories brushing an assumed 20%-of-budget cap this month
    fn rule_spending_alert(&self, user_id: i64, ctx: &GeneratorContext) -> Result<Vec<NewNudge>> {
        let Some(budget) = self.db.get_budget(user_id)? else {
            return Ok(Vec::new());
        };
        let cap = budget.amount.percent(20);
        if !cap.is_positive() {
            return Ok(Vec::new());
        }

        let month_start = month_start(ctx.now);
        let per_category = self.db.category_spend_between(user_id, month_start, ctx.now)?;

        let mut nudges = Vec::new();
        for (category, spent) in per_category {
            let share = spent.pct_of(cap).unwrap_or(0);
            if !(80..=120).contains(&share) {
                continue;
            }
            nudges.push(
                NewNudge::new(
                    user_id,
                    NudgeType::SpendingAlert,
                    format!(
                        "\"{}\" is at {} this month — {}% of its usual {} share.",
                        category, spent, share, cap
                    ),
                    format!("Month-to-date {} spend within 80-120% of the category cap", category),
                    2,
                    ctx.now + NudgeType::SpendingAlert.default_ttl(),
                )
                .with_amount(spent)
                .with_metadata(json!({ "category": category })),
            );
        }

        Ok(nudges)
    }

    /// Recent income running well under the trailing average
    fn rule_income_opportunity(&self, user_id: i64, ctx: &GeneratorContext) -> Option<NewNudge> {
        let week_ago = ctx.now - Duration::days(7);
        let month_ago = ctx.now - Duration::days(30);

        let mut week_income = Money::ZERO;
        let mut month_income = Money::ZERO;
        for tx in &ctx.transactions {
            if tx.kind != crate::models::TransactionKind::Income || tx.date > ctx.now {
                continue;
            }
            if tx.date >= month_ago {
                month_income += tx.amount;
            }
            if tx.date >= week_ago {
                week_income += tx.amount;
            }
        }

        let monthly_daily_avg = month_income.div(30);
        if !monthly_daily_avg.is_positive() {
            return None;
        }

        let expected_week = Money::from_minor(monthly_daily_avg.minor() * 7);
        let threshold = expected_week.percent(70);
        if week_income >= threshold {
            return None;
        }

        let deficit = expected_week - week_income;
        Some(
            NewNudge::new(
                user_id,
                NudgeType::IncomeOpportunity,
                format!(
                    "Income this week is {} against a typical {}. Worth lining up extra work to close the {} gap?",
                    week_income, expected_week, deficit
                ),
                "Trailing 7-day income under 70% of the 30-day average".to_string(),
                4,
                ctx.now + NudgeType::IncomeOpportunity.default_ttl(),
            )
            .with_amount(deficit),
        )
    }

    /// Consolidate, threshold, cap, rank, and stamp the shared risk
    /// context
    fn post_process(
        &self,
        user_id: i64,
        mut candidates: Vec<NewNudge>,
        profile: &FinancialProfile,
        ctx: &GeneratorContext,
    ) -> Vec<NewNudge> {
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        if profile.prefers_summary && candidates.len() >= 3 {
            let collapsed: Vec<NewNudge> = candidates.drain(..3).collect();
            let priority = collapsed.iter().map(|n| n.priority).max().unwrap_or(0);
            let lines: Vec<String> = collapsed.iter().map(|n| n.message.clone()).collect();
            let summary = NewNudge::new(
                user_id,
                NudgeType::Summary,
                lines.join(" "),
                format!("{} suggestions consolidated", collapsed.len()),
                priority,
                ctx.now + NudgeType::Summary.default_ttl(),
            )
            .with_metadata(json!({
                "consolidated_types": collapsed
                    .iter()
                    .map(|n| n.nudge_type.as_str())
                    .collect::<Vec<_>>(),
            }));
            candidates.insert(0, summary);
        }

        candidates.retain(|n| n.priority >= profile.priority_threshold);
        candidates.truncate(profile.frequency_pref.daily_cap() as usize);
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        let risk_context = RiskContext {
            risk_level: ctx.assessment.level,
            risk_score: ctx.assessment.score,
            trend: ctx.forecast.trend,
            payday: profile.income_rhythm.as_ref().map(|r| r.payday.clone()),
        };
        let risk_json = serde_json::to_value(&risk_context).unwrap_or(serde_json::Value::Null);
        for nudge in &mut candidates {
            match &mut nudge.metadata {
                serde_json::Value::Object(map) => {
                    map.insert("risk_context".into(), risk_json.clone());
                }
                other => {
                    *other = json!({ "risk_context": risk_json });
                }
            }
        }

        candidates
    }
}

/// How much could be put aside without endangering the week: the daily
/// net rate, bounded to the micro-save band.
fn safe_to_save(forecast: &CashFlowForecast) -> Money {
    forecast.rates.daily_net.clamp(MICRO_SAVE_MIN, MICRO_SAVE_MAX)
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountKind, NewTransaction, TransactionKind};

    fn seed_user(db: &Database, balance: Money) -> i64 {
        db.create_account(1, "Main", AccountKind::Checking, balance, true)
            .unwrap();
        1
    }

    #[test]
    fn test_low_balance_yields_exactly_one_emergency_nudge() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::from_major(800));

        let generator = NudgeGenerator::new(db);
        let nudges = generator.generate(user).unwrap();

        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].nudge_type, NudgeType::EmergencyBuffer);
        assert_eq!(nudges[0].priority, 10);
        assert_eq!(nudges[0].amount, Some(Money::from_major(200)));
    }

    #[test]
    fn test_zero_balance_is_not_an_emergency_buffer_case() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::ZERO);

        let generator = NudgeGenerator::new(db);
        let nudges = generator.generate(user).unwrap();

        assert!(nudges.iter().all(|n| n.nudge_type != NudgeType::EmergencyBuffer));
    }

    #[test]
    fn test_output_sorted_descending_and_thresholded() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::from_major(800));

        // EMI due in 3 days forces bill-pay (5) and bill-guard (6)
        // alongside the emergency buffer (10)
        let due = Utc::now().date_naive() + chrono::Duration::days(3);
        db.record_transaction(
            user,
            &NewTransaction {
                account_id: 1,
                kind: TransactionKind::Expense,
                amount: Money::from_major(100),
                category: "emi".into(),
                description: "loan".into(),
                date: Utc::now() - chrono::Duration::days(25),
                is_recurring: true,
                recurring_interval: Some(crate::models::RecurringInterval::Monthly),
                next_recurring_date: Some(due),
            },
        )
        .unwrap();

        let generator = NudgeGenerator::new(db.clone());
        let nudges = generator.generate(user).unwrap();
        assert!(nudges.len() >= 3);
        assert!(nudges.windows(2).all(|w| w[0].priority >= w[1].priority));

        // Raising the threshold drops the low-priority candidates
        let mut profile = db.get_profile(user).unwrap();
        profile.priority_threshold = 7;
        db.save_profile(&profile).unwrap();

        let nudges = generator.generate(user).unwrap();
        assert!(!nudges.is_empty());
        assert!(nudges.iter().all(|n| n.priority >= 7));
    }

    #[test]
    fn test_risk_context_attached_to_every_nudge() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::from_major(800));

        let generator = NudgeGenerator::new(db);
        let nudges = generator.generate(user).unwrap();

        for nudge in &nudges {
            let ctx = nudge.metadata.get("risk_context").unwrap();
            assert!(ctx.get("risk_score").is_some());
            assert!(ctx.get("risk_level").is_some());
        }
    }

    #[test]
    fn test_generation_persists_rhythm_and_stamps_payday() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::from_major(800));

        // Ten weekly salary deposits, matched by rent so the balance
        // stays in emergency-buffer territory
        for week in 1..=10 {
            let date = Utc::now() - chrono::Duration::days(7 * week);
            db.record_transaction(
                user,
                &NewTransaction {
                    account_id: 1,
                    kind: TransactionKind::Income,
                    amount: Money::from_major(1000),
                    category: "salary".into(),
                    description: "payroll".into(),
                    date,
                    is_recurring: false,
                    recurring_interval: None,
                    next_recurring_date: None,
                },
            )
            .unwrap();
            db.record_transaction(
                user,
                &NewTransaction {
                    account_id: 1,
                    kind: TransactionKind::Expense,
                    amount: Money::from_major(1000),
                    category: "rent".into(),
                    description: "rent".into(),
                    date,
                    is_recurring: false,
                    recurring_interval: None,
                    next_recurring_date: None,
                },
            )
            .unwrap();
        }

        let generator = NudgeGenerator::new(db.clone());
        let nudges = generator.generate(user).unwrap();

        // The rhythm cache lands in the stored profile
        let profile = db.get_profile(user).unwrap();
        let income = profile.income_rhythm.expect("income rhythm persisted");
        assert_eq!(income.cadence, rhythm::Cadence::Weekly);
        assert!(profile.spend_rhythm.is_some());
        assert!(profile.last_personalization_update.is_some());

        // And every nudge carries the learned payday
        assert!(!nudges.is_empty());
        for nudge in &nudges {
            let ctx = nudge.metadata.get("risk_context").unwrap();
            assert_eq!(
                ctx.get("payday").unwrap().as_str(),
                Some(income.payday.as_str())
            );
        }
    }

    #[test]
    fn test_summary_consolidation() {
        let db = Database::in_memory().unwrap();
        let user = seed_user(&db, Money::from_major(800));

        let due = Utc::now().date_naive() + chrono::Duration::days(3);
        db.record_transaction(
            user,
            &NewTransaction {
                account_id: 1,
                kind: TransactionKind::Expense,
                amount: Money::from_major(100),
                category: "emi".into(),
                description: "loan".into(),
                date: Utc::now() - chrono::Duration::days(25),
                is_recurring: true,
                recurring_interval: Some(crate::models::RecurringInterval::Monthly),
                next_recurring_date: Some(due),
            },
        )
        .unwrap();

        let mut profile = db.get_profile(user).unwrap();
        profile.prefers_summary = true;
        db.save_profile(&profile).unwrap();

        let generator = NudgeGenerator::new(db);
        let nudges = generator.generate(user).unwrap();

        assert_eq!(nudges[0].nudge_type, NudgeType::Summary);
        // Summary carries the highest collapsed priority
        assert_eq!(nudges[0].priority, 10);
    }
}
