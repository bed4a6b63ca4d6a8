//! Income/spend rhythm analysis
//!
//! Derives recurring patterns from transaction history: payday weekday,
//! income cadence, spending weekday/hour concentration, and category
//! shares. The output is a derived cache, a pure function of the input
//! history, persisted to the financial profile and safely recomputable at
//! any time. It feeds both the forecast model's seasonal hook and the
//! nudge generator's copy and timing decisions.

use chrono::{Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::{Transaction, TransactionKind};
use crate::money::Money;

/// How far back the analyzer looks
pub const LOOKBACK_DAYS: i64 = 120;

/// Fallback send hour before anything is learned
pub const DEFAULT_NUDGE_HOUR: u32 = 9;

/// Fixed hour-of-day buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HourSlot {
    /// 00:00-05:59
    Dawn,
    /// 06:00-11:59
    Morning,
    /// 12:00-16:59
    Afternoon,
    /// 17:00-20:59
    Evening,
    /// 21:00-23:59
    LateNight,
}

impl HourSlot {
    pub fn from_hour(hour: u32) -> HourSlot {
        match hour {
            0..=5 => Self::Dawn,
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::LateNight,
        }
    }

    /// Representative hour used when scheduling sends into this slot
    pub fn representative_hour(&self) -> u32 {
        match self {
            Self::Dawn => 5,
            Self::Morning => 9,
            Self::Afternoon => 14,
            Self::Evening => 19,
            Self::LateNight => 22,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::LateNight => "late-night",
        }
    }

    fn all() -> [HourSlot; 5] {
        [
            Self::Dawn,
            Self::Morning,
            Self::Afternoon,
            Self::Evening,
            Self::LateNight,
        ]
    }
}

impl std::fmt::Display for HourSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inferred income cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    Weekly,
    BiWeekly,
    Monthly,
    Irregular,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::Monthly => "monthly",
            Self::Irregular => "irregular",
        }
    }

    /// Expected days between income events under this cadence
    pub fn typical_gap_days(&self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::BiWeekly => 14,
            Self::Monthly | Self::Irregular => 30,
        }
    }

    /// Classify from the average gap in days between income events
    fn from_mean_gap(days: i64) -> Cadence {
        if days <= 8 {
            Self::Weekly
        } else if days <= 16 {
            Self::BiWeekly
        } else if days <= 40 {
            Self::Monthly
        } else {
            Self::Irregular
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Learned income pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRhythm {
    /// Weekday carrying the largest share of income
    pub payday: String,
    /// That weekday's share of total income, 0-100
    pub reliability_pct: i64,
    pub hour_slot: HourSlot,
    pub cadence: Cadence,
    pub lookback_days: i64,
}

/// A weekday spending noticeably above the weekday average
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskDay {
    pub weekday: String,
    /// Percent above the average weekday spend
    pub overspend_pct: i64,
}

/// A category's share of total spend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub share_pct: i64,
}

/// Learned spending pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRhythm {
    pub weekend_share_pct: i64,
    pub late_night_share_pct: i64,
    pub high_risk_days: Vec<HighRiskDay>,
    /// Top 3 categories by spend share
    pub top_categories: Vec<CategoryShare>,
    pub peak_hour_slot: HourSlot,
}

/// Combined analyzer output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhythmProfile {
    pub income_rhythm: Option<IncomeRhythm>,
    pub spend_rhythm: SpendRhythm,
    /// Hour to schedule nudges into, derived from the income slot
    pub optimal_hour: u32,
    pub lookback_days: i64,
}

/// Analyze the user's history over the 120-day lookback
pub fn analyze(transactions: &[Transaction]) -> RhythmProfile {
    analyze_from(transactions, Utc::now().date_naive())
}

/// Deterministic variant of [`analyze`]
pub fn analyze_from(transactions: &[Transaction], today: NaiveDate) -> RhythmProfile {
    let cutoff = today - Duration::days(LOOKBACK_DAYS);
    let window: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| {
            let d = t.date.date_naive();
            d >= cutoff && d <= today
        })
        .collect();

    let income_rhythm = income_rhythm(&window);
    let spend_rhythm = spend_rhythm(&window);

    let optimal_hour = income_rhythm
        .as_ref()
        .map(|r| r.hour_slot.representative_hour())
        .unwrap_or(DEFAULT_NUDGE_HOUR);

    RhythmProfile {
        income_rhythm,
        spend_rhythm,
        optimal_hour,
        lookback_days: LOOKBACK_DAYS,
    }
}

fn weekday_name(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn income_rhythm(window: &[&Transaction]) -> Option<IncomeRhythm> {
    let incomes: Vec<&&Transaction> = window
        .iter()
        .filter(|t| t.kind == TransactionKind::Income)
        .collect();
    if incomes.is_empty() {
        return None;
    }

    // Weekday with the highest total income wins payday
    let mut by_weekday = [Money::ZERO; 7];
    let mut by_slot: [(HourSlot, Money); 5] =
        HourSlot::all().map(|s| (s, Money::ZERO));
    let mut total = Money::ZERO;
    for tx in &incomes {
        let idx = tx.date.weekday().num_days_from_monday() as usize;
        by_weekday[idx] += tx.amount;
        total += tx.amount;

        let slot = HourSlot::from_hour(tx.date.hour());
        for entry in by_slot.iter_mut() {
            if entry.0 == slot {
                entry.1 += tx.amount;
            }
        }
    }

    let payday_idx = (0..7).max_by_key(|&i| by_weekday[i]).unwrap_or(0);
    let reliability_pct = by_weekday[payday_idx].pct_of(total).unwrap_or(0);

    let hour_slot = by_slot
        .iter()
        .max_by_key(|(_, amount)| *amount)
        .map(|(slot, _)| *slot)
        .unwrap_or(HourSlot::Morning);

    // Cadence from the mean gap between income events; needs at least two
    let mut dates: Vec<NaiveDate> = incomes.iter().map(|t| t.date.date_naive()).collect();
    dates.sort();
    dates.dedup();
    let cadence = if dates.len() < 2 {
        Cadence::Irregular
    } else {
        let span = (dates[dates.len() - 1] - dates[0]).num_days();
        Cadence::from_mean_gap(span / (dates.len() as i64 - 1))
    };

    Some(IncomeRhythm {
        payday: weekday_name(WEEKDAYS[payday_idx]).to_string(),
        reliability_pct,
        hour_slot,
        cadence,
        lookback_days: LOOKBACK_DAYS,
    })
}

fn spend_rhythm(window: &[&Transaction]) -> SpendRhythm {
    let mut by_weekday = [Money::ZERO; 7];
    let mut by_slot: [(HourSlot, Money); 5] = HourSlot::all().map(|s| (s, Money::ZERO));
    let mut by_category: Vec<(String, Money)> = Vec::new();
    let mut total = Money::ZERO;
    let mut weekend = Money::ZERO;
    let mut late_night = Money::ZERO;

    for tx in window {
        if tx.kind != TransactionKind::Expense {
            continue;
        }
        total += tx.amount;

        let weekday = tx.date.weekday();
        by_weekday[weekday.num_days_from_monday() as usize] += tx.amount;
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            weekend += tx.amount;
        }

        let slot = HourSlot::from_hour(tx.date.hour());
        if slot == HourSlot::LateNight {
            late_night += tx.amount;
        }
        for entry in by_slot.iter_mut() {
            if entry.0 == slot {
                entry.1 += tx.amount;
            }
        }

        match by_category.iter_mut().find(|(c, _)| *c == tx.category) {
            Some((_, amount)) => *amount += tx.amount,
            None => by_category.push((tx.category.clone(), tx.amount)),
        }
    }

    // Weekdays spending more than 1.2x the average weekday are high risk
    let avg_weekday = total.div(7);
    let mut high_risk_days = Vec::new();
    if avg_weekday.is_positive() {
        for (i, spend) in by_weekday.iter().enumerate() {
            let pct = spend.pct_of(avg_weekday).unwrap_or(0);
            if pct > 120 {
                high_risk_days.push(HighRiskDay {
                    weekday: weekday_name(WEEKDAYS[i]).to_string(),
                    overspend_pct: pct - 100,
                });
            }
        }
    }

    by_category.sort_by(|a, b| b.1.cmp(&a.1));
    let top_categories = by_category
        .iter()
        .take(3)
        .map(|(category, amount)| CategoryShare {
            category: category.clone(),
            share_pct: amount.pct_of(total).unwrap_or(0),
        })
        .collect();

    let peak_hour_slot = by_slot
        .iter()
        .max_by_key(|(_, amount)| *amount)
        .map(|(slot, _)| *slot)
        .unwrap_or(HourSlot::Afternoon);

    SpendRhythm {
        weekend_share_pct: weekend.pct_of(total).unwrap_or(0),
        late_night_share_pct: late_night.pct_of(total).unwrap_or(0),
        high_risk_days,
        top_categories,
        peak_hour_slot,
    }
}
