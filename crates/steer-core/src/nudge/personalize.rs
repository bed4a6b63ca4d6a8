//! Personalization and preference filtering
//!
//! Re-ranks and filters candidate nudges against the learned profile,
//! predicts per-type acceptance from history, enforces the rolling
//! send cap, and ingests feedback back into the profile.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{FinancialProfile, FrequencyPref, NewNudge, NudgeAction, NudgeStatus};
use crate::nudge::NudgeType;
use crate::rhythm::DEFAULT_NUDGE_HOUR;

/// Sample window for acceptance prediction
const PREDICTION_WINDOW: u32 = 20;
/// Ratings at or above this promote the nudge type
const PROMOTE_RATING: i32 = 4;
/// Ratings at or below this demote the nudge type
const DEMOTE_RATING: i32 = 2;

/// How much history backs a success prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionConfidence {
    Low,
    Medium,
    High,
}

impl PredictionConfidence {
    fn from_samples(n: usize) -> Self {
        if n >= 20 {
            Self::High
        } else if n >= 10 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Predicted acceptance for one nudge type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessPrediction {
    /// 0.0 to 1.0; 0.5 when there is no history to go on
    pub probability: f64,
    pub confidence: PredictionConfidence,
    pub sample_size: usize,
}

pub struct PersonalizationFilter {
    db: Database,
}

impl PersonalizationFilter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Drop disliked types, apply the frequency tier's priority floor,
    /// and sort preferred types first (priority descending within each
    /// group).
    pub fn filter(&self, mut candidates: Vec<NewNudge>, profile: &FinancialProfile) -> Vec<NewNudge> {
        candidates.retain(|n| !profile.disliked_nudge_types.contains(&n.nudge_type));

        if profile.frequency_pref == FrequencyPref::Low {
            candidates.retain(|n| n.priority >= 5);
        }

        candidates.sort_by(|a, b| {
            let a_pref = profile.preferred_nudge_types.contains(&a.nudge_type);
            let b_pref = profile.preferred_nudge_types.contains(&b.nudge_type);
            b_pref.cmp(&a_pref).then(b.priority.cmp(&a.priority))
        });

        candidates
    }

    /// Acceptance probability over the last few same-type nudges.
    /// With no history the answer is an even 0.5 at low confidence.
    pub fn predict_nudge_success(
        &self,
        user_id: i64,
        nudge_type: NudgeType,
    ) -> Result<SuccessPrediction> {
        let samples = self
            .db
            .list_nudges_by_type(user_id, nudge_type, PREDICTION_WINDOW)?;

        if samples.is_empty() {
            return Ok(SuccessPrediction {
                probability: 0.5,
                confidence: PredictionConfidence::Low,
                sample_size: 0,
            });
        }

        let executed = samples
            .iter()
            .filter(|n| n.status == NudgeStatus::Executed)
            .count();

        Ok(SuccessPrediction {
            probability: executed as f64 / samples.len() as f64,
            confidence: PredictionConfidence::from_samples(samples.len()),
            sample_size: samples.len(),
        })
    }

    /// Rolling 24-hour send cap for the user's frequency tier
    pub fn should_send_nudge_now(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let profile = self.db.get_profile(user_id)?;
        let sent = self.db.count_nudges_since(user_id, now - Duration::hours(24))?;

        Ok(sent < profile.frequency_pref.daily_cap())
    }

    /// The learned best hour to reach the user, defaulting to 9
    pub fn optimal_nudge_time(&self, user_id: i64) -> Result<u32> {
        let profile = self.db.get_profile(user_id)?;
        Ok(profile.optimal_nudge_hour.unwrap_or(DEFAULT_NUDGE_HOUR))
    }

    /// Ingest explicit feedback on a nudge and fold it into the profile
    pub fn collect_feedback(
        &self,
        user_id: i64,
        nudge_id: i64,
        rating: Option<i32>,
        was_helpful: Option<bool>,
        dismiss_reason: Option<&str>,
    ) -> Result<()> {
        self.db
            .update_nudge_feedback(user_id, nudge_id, rating, was_helpful, dismiss_reason)?;

        let Some(nudge) = self.db.get_nudge(user_id, nudge_id)? else {
            return Ok(());
        };

        let positive = rating.is_some_and(|r| r >= PROMOTE_RATING) || was_helpful == Some(true);
        let negative = rating.is_some_and(|r| r <= DEMOTE_RATING) || was_helpful == Some(false);

        let mut profile = self.db.get_profile(user_id)?;
        if positive {
            promote(&mut profile, nudge.nudge_type);
        } else if negative {
            demote(&mut profile, nudge.nudge_type);
        }
        profile.optimal_nudge_hour = self.recompute_optimal_hour(user_id)?;
        profile.last_personalization_update = Some(Utc::now());
        self.db.save_profile(&profile)?;

        debug!(
            user_id,
            nudge_id,
            nudge_type = %nudge.nudge_type,
            positive,
            "feedback folded into profile"
        );

        Ok(())
    }

    /// Response-driven adjustment fired after accept/reject. An accept
    /// is a positive signal without the user filling in a rating.
    pub fn record_response(&self, user_id: i64) -> Result<()> {
        let mut profile = self.db.get_profile(user_id)?;
        profile.optimal_nudge_hour = self.recompute_optimal_hour(user_id)?;
        profile.last_personalization_update = Some(Utc::now());
        self.db.save_profile(&profile)?;

        Ok(())
    }

    /// Hour-of-day with the most positive responses; ties resolve to
    /// the hour seen first.
    fn recompute_optimal_hour(&self, user_id: i64) -> Result<Option<u32>> {
        let responded = self.db.list_responded_nudges(user_id, 200)?;

        let mut counts: Vec<(u32, u32)> = Vec::new();
        for nudge in responded.iter().rev() {
            if !is_positive_response(nudge) {
                continue;
            }
            let hour = nudge.created_at.hour();
            match counts.iter_mut().find(|(h, _)| *h == hour) {
                Some((_, c)) => *c += 1,
                None => counts.push((hour, 1)),
            }
        }

        // Strictly-greater comparison keeps the first-seen hour on ties
        let mut best: Option<(u32, u32)> = None;
        for (hour, count) in counts {
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((hour, count));
            }
        }

        Ok(best.map(|(hour, _)| hour))
    }
}

fn is_positive_response(nudge: &NudgeAction) -> bool {
    nudge.status == NudgeStatus::Executed
        || nudge.was_helpful == Some(true)
        || nudge.feedback_rating.is_some_and(|r| r >= PROMOTE_RATING)
}

fn promote(profile: &mut FinancialProfile, nudge_type: NudgeType) {
    profile.disliked_nudge_types.retain(|t| *t != nudge_type);
    if !profile.preferred_nudge_types.contains(&nudge_type) {
        profile.preferred_nudge_types.push(nudge_type);
    }
}

fn demote(profile: &mut FinancialProfile, nudge_type: NudgeType) {
    profile.preferred_nudge_types.retain(|t| *t != nudge_type);
    if !profile.disliked_nudge_types.contains(&nudge_type) {
        profile.disliked_nudge_types.push(nudge_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNudge;
    use crate::money::Money;

    fn candidate(ty: NudgeType, priority: i32) -> NewNudge {
        NewNudge::new(1, ty, "m", "r", priority, Utc::now() + Duration::hours(48))
    }

    fn filter() -> (Database, PersonalizationFilter) {
        let db = Database::in_memory().unwrap();
        (db.clone(), PersonalizationFilter::new(db))
    }

    #[test]
    fn test_disliked_types_dropped_and_preferred_first() {
        let (_, filter) = filter();
        let mut profile = FinancialProfile::new(1);
        profile.disliked_nudge_types.push(NudgeType::SpendingAlert);
        profile.preferred_nudge_types.push(NudgeType::MicroSave);

        let out = filter.filter(
            vec![
                candidate(NudgeType::EmergencyBuffer, 10),
                candidate(NudgeType::SpendingAlert, 2),
                candidate(NudgeType::MicroSave, 6),
            ],
            &profile,
        );

        // Preferred micro-save outranks the higher-priority emergency
        let types: Vec<NudgeType> = out.iter().map(|n| n.nudge_type).collect();
        assert_eq!(types, vec![NudgeType::MicroSave, NudgeType::EmergencyBuffer]);
    }

    #[test]
    fn test_low_frequency_keeps_only_high_priority() {
        let (_, filter) = filter();
        let mut profile = FinancialProfile::new(1);
        profile.frequency_pref = FrequencyPref::Low;

        let out = filter.filter(
            vec![
                candidate(NudgeType::IncomeOpportunity, 4),
                candidate(NudgeType::BillPay, 5),
                candidate(NudgeType::SpendingAlert, 2),
            ],
            &profile,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nudge_type, NudgeType::BillPay);
    }

    #[test]
    fn test_prediction_defaults_without_history() {
        let (_, filter) = filter();
        let prediction = filter.predict_nudge_success(1, NudgeType::AutoSave).unwrap();

        assert_eq!(prediction.probability, 0.5);
        assert_eq!(prediction.confidence, PredictionConfidence::Low);
        assert_eq!(prediction.sample_size, 0);
    }

    #[test]
    fn test_prediction_counts_executed_share() {
        let (db, filter) = filter();
        for i in 0..10 {
            let nudge = db
                .upsert_nudge(&candidate(NudgeType::MicroSave, 6).with_amount(Money::from_major(50)))
                .unwrap();
            let to = if i < 7 {
                NudgeStatus::Executed
            } else {
                NudgeStatus::Rejected
            };
            db.transition_nudge(1, nudge.id, to, Utc::now(), |_, _| Ok(None))
                .unwrap();
        }

        let prediction = filter.predict_nudge_success(1, NudgeType::MicroSave).unwrap();
        assert_eq!(prediction.sample_size, 10);
        assert!((prediction.probability - 0.7).abs() < 1e-9);
        assert_eq!(prediction.confidence, PredictionConfidence::Medium);
    }

    #[test]
    fn test_daily_cap_enforced() {
        let (db, filter) = filter();
        let mut profile = FinancialProfile::new(1);
        profile.frequency_pref = FrequencyPref::Low;
        db.save_profile(&profile).unwrap();

        let now = Utc::now();
        assert!(filter.should_send_nudge_now(1, now).unwrap());

        db.upsert_nudge(&candidate(NudgeType::AutoSave, 3)).unwrap();
        db.upsert_nudge(&candidate(NudgeType::BillPay, 5)).unwrap();

        // LOW tier caps at 2 per rolling day
        assert!(!filter.should_send_nudge_now(1, now).unwrap());
    }

    #[test]
    fn test_feedback_promotes_and_demotes() {
        let (db, filter) = filter();
        let liked = db.upsert_nudge(&candidate(NudgeType::MicroSave, 6)).unwrap();
        let disliked = db.upsert_nudge(&candidate(NudgeType::SpendingAlert, 2)).unwrap();

        filter.collect_feedback(1, liked.id, Some(5), None, None).unwrap();
        filter
            .collect_feedback(1, disliked.id, Some(1), None, Some("too noisy"))
            .unwrap();

        let profile = db.get_profile(1).unwrap();
        assert!(profile.preferred_nudge_types.contains(&NudgeType::MicroSave));
        assert!(profile.disliked_nudge_types.contains(&NudgeType::SpendingAlert));
        assert!(profile.last_personalization_update.is_some());

        // A later positive rating pulls the type back out of disliked
        filter.collect_feedback(1, disliked.id, Some(5), None, None).unwrap();
        let profile = db.get_profile(1).unwrap();
        assert!(!profile.disliked_nudge_types.contains(&NudgeType::SpendingAlert));
    }

    #[test]
    fn test_optimal_hour_follows_positive_responses() {
        let (db, filter) = filter();
        for _ in 0..3 {
            let nudge = db.upsert_nudge(&candidate(NudgeType::MicroSave, 6)).unwrap();
            db.transition_nudge(1, nudge.id, NudgeStatus::Executed, Utc::now(), |_, _| Ok(None))
                .unwrap();
        }

        filter.record_response(1).unwrap();
        let profile = db.get_profile(1).unwrap();
        assert_eq!(profile.optimal_nudge_hour, Some(Utc::now().hour()));
    }
}
