//! Nudge type registry
//!
//! The closed set of nudge types, with everything that dispatches on the
//! type kept in one place: string encoding, estimated-impact formula, and
//! the default expiry used at generation time. Generators, executors, and
//! explanations all consult this enum rather than matching on strings.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Money;

/// The closed set of nudge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NudgeType {
    /// Move spare budget toward a goal or generic savings
    AutoSave,
    /// Pay an upcoming bill early
    BillPay,
    /// Ring-fence cash for an upcoming bill
    BillGuard,
    /// A category is approaching its share of the budget
    SpendingAlert,
    /// Recent income is running below the trailing average
    IncomeOpportunity,
    /// Balance has fallen below the emergency floor
    EmergencyBuffer,
    /// Small save sized by the risk-aware safe-to-save estimate
    MicroSave,
    /// EMIs due soon exceed the projected cushion
    GuardianAlert,
    /// A category is accelerating against its weekly baseline
    SpendingGuardrail,
    /// A goal has fallen behind its time-proportional schedule
    GoalBackstop,
    /// Synthetic consolidation of several candidates
    Summary,
}

impl NudgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoSave => "auto-save",
            Self::BillPay => "bill-pay",
            Self::BillGuard => "bill-guard",
            Self::SpendingAlert => "spending-alert",
            Self::IncomeOpportunity => "income-opportunity",
            Self::EmergencyBuffer => "emergency-buffer",
            Self::MicroSave => "micro-save",
            Self::GuardianAlert => "guardian-alert",
            Self::SpendingGuardrail => "spending-guardrail",
            Self::GoalBackstop => "goal-backstop",
            Self::Summary => "summary",
        }
    }

    /// All concrete types (excludes the synthetic summary)
    pub fn all() -> &'static [NudgeType] {
        &[
            Self::AutoSave,
            Self::BillPay,
            Self::BillGuard,
            Self::SpendingAlert,
            Self::IncomeOpportunity,
            Self::EmergencyBuffer,
            Self::MicroSave,
            Self::GuardianAlert,
            Self::SpendingGuardrail,
            Self::GoalBackstop,
        ]
    }

    /// Estimated financial impact of executing a nudge of this type.
    ///
    /// A fixed lookup table, applied at execution time. Savings-style
    /// nudges count their full amount; alerts count a fraction of the
    /// flagged amount; bill-pay counts a flat late-fee avoidance.
    pub fn impact(&self, amount: Money) -> Money {
        match self {
            Self::AutoSave | Self::MicroSave | Self::GoalBackstop => amount,
            Self::BillPay => Money::from_major(50),
            Self::BillGuard => amount.percent(5),
            Self::SpendingAlert => amount.percent(10),
            Self::GuardianAlert => amount.percent(80),
            Self::SpendingGuardrail => amount.percent(15),
            Self::IncomeOpportunity => amount.percent(50),
            Self::EmergencyBuffer | Self::Summary => Money::ZERO,
        }
    }

    /// How long a freshly generated nudge of this type stays actionable
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::EmergencyBuffer => Duration::hours(12),
            Self::GuardianAlert => Duration::hours(24),
            _ => Duration::hours(48),
        }
    }

    /// Whether executing this nudge moves money (vs. an informational flag)
    pub fn moves_money(&self) -> bool {
        matches!(
            self,
            Self::AutoSave | Self::MicroSave | Self::GoalBackstop | Self::BillPay
        )
    }
}

impl fmt::Display for NudgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NudgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto-save" => Ok(Self::AutoSave),
            "bill-pay" => Ok(Self::BillPay),
            "bill-guard" => Ok(Self::BillGuard),
            "spending-alert" => Ok(Self::SpendingAlert),
            "income-opportunity" => Ok(Self::IncomeOpportunity),
            "emergency-buffer" => Ok(Self::EmergencyBuffer),
            "micro-save" => Ok(Self::MicroSave),
            "guardian-alert" => Ok(Self::GuardianAlert),
            "spending-guardrail" => Ok(Self::SpendingGuardrail),
            "goal-backstop" => Ok(Self::GoalBackstop),
            "summary" => Ok(Self::Summary),
            _ => Err(format!("Unknown nudge type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        for ty in NudgeType::all() {
            assert_eq!(ty.as_str().parse::<NudgeType>().unwrap(), *ty);
        }
        assert_eq!("summary".parse::<NudgeType>().unwrap(), NudgeType::Summary);
    }

    #[test]
    fn test_impact_table_exactness() {
        // bill-pay is a flat late-fee estimate regardless of amount
        assert_eq!(
            NudgeType::BillPay.impact(Money::from_major(10)),
            Money::from_major(50)
        );
        assert_eq!(
            NudgeType::BillPay.impact(Money::from_major(100_000)),
            Money::from_major(50)
        );

        assert_eq!(
            NudgeType::AutoSave.impact(Money::from_major(300)),
            Money::from_major(300)
        );
        assert_eq!(
            NudgeType::SpendingGuardrail.impact(Money::from_major(1000)),
            Money::from_major(150)
        );
        assert_eq!(
            NudgeType::GuardianAlert.impact(Money::from_major(500)),
            Money::from_major(400)
        );
        assert_eq!(
            NudgeType::BillGuard.impact(Money::from_major(2000)),
            Money::from_major(100)
        );
        assert_eq!(
            NudgeType::IncomeOpportunity.impact(Money::from_major(600)),
            Money::from_major(300)
        );
        assert_eq!(
            NudgeType::EmergencyBuffer.impact(Money::from_major(999)),
            Money::ZERO
        );
    }

    #[test]
    fn test_emergency_buffer_expires_fast() {
        assert_eq!(NudgeType::EmergencyBuffer.default_ttl(), Duration::hours(12));
    }
}
