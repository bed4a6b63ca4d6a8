//! Domain models for Steer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::nudge::NudgeType;
use crate::rhythm::{IncomeRhythm, SpendRhythm};

/// A ledger account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Current balance in minor units
    pub balance: Money,
    /// Default account for nudge-driven transfers
    pub is_default: bool,
    pub kind: AccountKind,
    pub created_at: DateTime<Utc>,
}

/// Account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
    Credit,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit" => Ok(Self::Credit),
            _ => Err(format!("Unknown account kind: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a transaction; amounts are always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Sign applied when reconciling against an account balance
    pub fn sign(&self) -> i64 {
        match self {
            Self::Income => 1,
            Self::Expense => -1,
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interval for recurring transactions (EMIs, rent, salaries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringInterval {
    Weekly,
    Monthly,
    Yearly,
}

impl RecurringInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

impl std::str::FromStr for RecurringInterval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Unknown recurring interval: {}", s)),
        }
    }
}

impl std::fmt::Display for RecurringInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger transaction. Immutable once created, except the recurring
/// lifecycle fields maintained by the recurring sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub kind: TransactionKind,
    /// Always positive; direction comes from `kind`
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub next_recurring_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A new transaction before insertion
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub kind: TransactionKind,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub next_recurring_date: Option<NaiveDate>,
}

/// The user's active budget. One active budget per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: i64,
    /// Monthly budget amount
    pub amount: Money,
    /// Safety flag set by the guardrail agent to block discretionary spend
    pub is_locked: bool,
    pub last_alert_sent: Option<DateTime<Utc>>,
}

/// How often the user wants to be nudged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyPref {
    Low,
    #[default]
    Normal,
    High,
}

impl FrequencyPref {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Rolling 24-hour send cap for this tier
    pub fn daily_cap(&self) -> i64 {
        match self {
            Self::Low => 2,
            Self::Normal => 5,
            Self::High => 10,
        }
    }

    /// Autopilot micro-save caps: (per day, per week)
    pub fn autopilot_caps(&self) -> (Money, Money) {
        match self {
            Self::Low => (Money::from_major(200), Money::from_major(800)),
            Self::Normal => (Money::from_major(400), Money::from_major(1500)),
            Self::High => (Money::from_major(600), Money::from_major(2500)),
        }
    }
}

impl std::str::FromStr for FrequencyPref {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown frequency preference: {}", s)),
        }
    }
}

impl std::fmt::Display for FrequencyPref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user learned personalization state. Created lazily on first
/// feedback or rhythm analysis; never deleted while the user exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialProfile {
    pub user_id: i64,
    pub preferred_nudge_types: Vec<NudgeType>,
    pub disliked_nudge_types: Vec<NudgeType>,
    pub frequency_pref: FrequencyPref,
    /// Learned hour-of-day with the most positive responses
    pub optimal_nudge_hour: Option<u32>,
    /// When set, newly created nudges are accepted immediately
    pub auto_nudge_enabled: bool,
    /// Collapse the top candidates into one summary nudge
    pub prefers_summary: bool,
    /// Candidates below this priority are dropped at generation time
    pub priority_threshold: i32,
    /// Derived cache of the rhythm analyzer output
    pub income_rhythm: Option<IncomeRhythm>,
    pub spend_rhythm: Option<SpendRhythm>,
    pub spending_style: Option<String>,
    pub last_personalization_update: Option<DateTime<Utc>>,
}

impl FinancialProfile {
    /// Defaults used before the user has any learned state
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            preferred_nudge_types: vec![],
            disliked_nudge_types: vec![],
            frequency_pref: FrequencyPref::Normal,
            optimal_nudge_hour: None,
            auto_nudge_enabled: false,
            prefers_summary: false,
            priority_threshold: 0,
            income_rhythm: None,
            spend_rhythm: None,
            spending_style: None,
            last_personalization_update: None,
        }
    }
}

/// Nudge lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeStatus {
    Pending,
    Executed,
    Rejected,
    Expired,
}

impl NudgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for NudgeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "executed" => Ok(Self::Executed),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown nudge status: {}", s)),
        }
    }
}

impl std::fmt::Display for NudgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted nudge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeAction {
    pub id: i64,
    pub user_id: i64,
    pub nudge_type: NudgeType,
    pub amount: Option<Money>,
    pub message: String,
    pub reason: String,
    /// 0 (lowest) to 10 (highest)
    pub priority: i32,
    pub status: NudgeStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Measured impact, set at execution time from the fixed table
    pub impact: Option<Money>,
    /// Risk context, automation info, explanation cache
    pub metadata: serde_json::Value,
    pub feedback_rating: Option<i32>,
    pub was_helpful: Option<bool>,
    pub dismiss_reason: Option<String>,
    /// Created by an agent rather than a user action
    pub automated: bool,
    /// Idempotency key for agent suppression windows
    pub dedupe_key: Option<String>,
}

impl NudgeAction {
    /// Expiry is passive: a pending nudge past its deadline counts as
    /// expired even before the sweep has stamped it.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == NudgeStatus::Pending && self.expires_at > now
    }
}

/// A candidate nudge before persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNudge {
    pub user_id: i64,
    pub nudge_type: NudgeType,
    pub amount: Option<Money>,
    pub message: String,
    pub reason: String,
    pub priority: i32,
    pub expires_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub automated: bool,
    pub dedupe_key: Option<String>,
}

impl NewNudge {
    pub fn new(
        user_id: i64,
        nudge_type: NudgeType,
        message: impl Into<String>,
        reason: impl Into<String>,
        priority: i32,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            nudge_type,
            amount: None,
            message: message.into(),
            reason: reason.into(),
            priority,
            expires_at,
            metadata: serde_json::Value::Null,
            automated: false,
            dedupe_key: None,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn automated(mut self) -> Self {
        self.automated = true;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}

/// Three-tier risk meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Caution,
    Danger,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Danger => "danger",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "caution" => Ok(Self::Caution),
            "danger" => Ok(Self::Danger),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of a risk computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub id: i64,
    pub user_id: i64,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub drivers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Watchdog flag that short-circuits all automated execution when locked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSafetyState {
    pub user_id: i64,
    pub autopilot_locked: bool,
    pub reason: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Savings goal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A savings target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub target_amount: Money,
    pub saved_amount: Money,
    pub target_date: NaiveDate,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn remaining(&self) -> Money {
        (self.target_amount - self.saved_amount).max(Money::ZERO)
    }
}

/// An upcoming bill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub amount: Money,
    /// Day of month the bill falls due
    pub due_day: u32,
    pub next_due_date: NaiveDate,
    pub is_paid: bool,
    pub auto_pay_enabled: bool,
    pub category: String,
}

/// Bill envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Active,
    Released,
}

impl EnvelopeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
        }
    }
}

impl std::str::FromStr for EnvelopeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "released" => Ok(Self::Released),
            _ => Err(format!("Unknown envelope status: {}", s)),
        }
    }
}

/// Soft reservation protecting cash for a bill. A logical hold, not a
/// real sub-account: nothing is segregated at the ledger level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillEnvelope {
    pub id: i64,
    pub bill_id: i64,
    pub protected_amount: Money,
    pub locked_until: NaiveDate,
    pub status: EnvelopeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_enum_round_trips() {
        assert_eq!("income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert_eq!(NudgeStatus::Executed.as_str(), "executed");
        assert_eq!("danger".parse::<RiskLevel>().unwrap(), RiskLevel::Danger);
        assert_eq!(FrequencyPref::Low.daily_cap(), 2);
    }

    #[test]
    fn test_goal_remaining_floors_at_zero() {
        let goal = Goal {
            id: 1,
            user_id: 1,
            name: "Vacation".into(),
            target_amount: Money::from_major(1000),
            saved_amount: Money::from_major(1200),
            target_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            status: GoalStatus::Active,
            created_at: Utc::now(),
        };
        assert_eq!(goal.remaining(), Money::ZERO);
    }

    #[test]
    fn test_nudge_active_is_read_time_expiry() {
        let now = Utc::now();
        let nudge = NudgeAction {
            id: 1,
            user_id: 1,
            nudge_type: NudgeType::AutoSave,
            amount: None,
            message: String::new(),
            reason: String::new(),
            priority: 5,
            status: NudgeStatus::Pending,
            created_at: now - Duration::hours(30),
            responded_at: None,
            executed_at: None,
            expires_at: now - Duration::hours(6),
            impact: None,
            metadata: serde_json::Value::Null,
            feedback_rating: None,
            was_helpful: None,
            dismiss_reason: None,
            automated: false,
            dedupe_key: None,
        };
        // Past expiry: inactive even though the status is still pending
        assert!(!nudge.is_active(now));
        assert_eq!(nudge.status, NudgeStatus::Pending);
    }
}
