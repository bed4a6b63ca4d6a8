//! Financial profile operations
//!
//! Vec- and struct-valued fields are stored as JSON text columns; a
//! value that fails to parse degrades to the default rather than
//! failing the whole profile load.

use rusqlite::{params, Row};

use super::{fmt_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{FinancialProfile, FrequencyPref};

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<FinancialProfile> {
    let preferred_str: String = row.get(1)?;
    let disliked_str: String = row.get(2)?;
    let freq_str: String = row.get(3)?;
    let income_rhythm_str: Option<String> = row.get(8)?;
    let spend_rhythm_str: Option<String> = row.get(9)?;
    let updated_str: Option<String> = row.get(11)?;

    Ok(FinancialProfile {
        user_id: row.get(0)?,
        preferred_nudge_types: serde_json::from_str(&preferred_str).unwrap_or_default(),
        disliked_nudge_types: serde_json::from_str(&disliked_str).unwrap_or_default(),
        frequency_pref: freq_str.parse().unwrap_or(FrequencyPref::Normal),
        optimal_nudge_hour: row.get(4)?,
        auto_nudge_enabled: row.get(5)?,
        prefers_summary: row.get(6)?,
        priority_threshold: row.get(7)?,
        income_rhythm: income_rhythm_str.and_then(|s| serde_json::from_str(&s).ok()),
        spend_rhythm: spend_rhythm_str.and_then(|s| serde_json::from_str(&s).ok()),
        spending_style: row.get(10)?,
        last_personalization_update: updated_str.map(|s| parse_datetime(&s)),
    })
}

const PROFILE_COLS: &str = "user_id, preferred_nudge_types, disliked_nudge_types, frequency_pref, \
                            optimal_nudge_hour, auto_nudge_enabled, prefers_summary, \
                            priority_threshold, income_rhythm, spend_rhythm, spending_style, \
                            last_personalization_update";

impl Database {
    /// The user's profile, or the defaults if none has been persisted.
    /// Profiles are created lazily; reading never creates a row.
    pub fn get_profile(&self, user_id: i64) -> Result<FinancialProfile> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLS} FROM financial_profiles WHERE user_id = ?"),
                params![user_id],
                row_to_profile,
            )
            .ok();

        Ok(profile.unwrap_or_else(|| FinancialProfile::new(user_id)))
    }

    /// Persist the whole profile, creating the row on first write
    pub fn save_profile(&self, profile: &FinancialProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO financial_profiles \
             (user_id, preferred_nudge_types, disliked_nudge_types, frequency_pref, \
              optimal_nudge_hour, auto_nudge_enabled, prefers_summary, priority_threshold, \
              income_rhythm, spend_rhythm, spending_style, last_personalization_update) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               preferred_nudge_types = excluded.preferred_nudge_types, \
               disliked_nudge_types = excluded.disliked_nudge_types, \
               frequency_pref = excluded.frequency_pref, \
               optimal_nudge_hour = excluded.optimal_nudge_hour, \
               auto_nudge_enabled = excluded.auto_nudge_enabled, \
               prefers_summary = excluded.prefers_summary, \
               priority_threshold = excluded.priority_threshold, \
               income_rhythm = excluded.income_rhythm, \
               spend_rhythm = excluded.spend_rhythm, \
               spending_style = excluded.spending_style, \
               last_personalization_update = excluded.last_personalization_update",
            params![
                profile.user_id,
                serde_json::to_string(&profile.preferred_nudge_types)?,
                serde_json::to_string(&profile.disliked_nudge_types)?,
                profile.frequency_pref.as_str(),
                profile.optimal_nudge_hour,
                profile.auto_nudge_enabled,
                profile.prefers_summary,
                profile.priority_threshold,
                profile
                    .income_rhythm
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                profile
                    .spend_rhythm
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                profile.spending_style,
                profile.last_personalization_update.map(fmt_datetime),
            ],
        )?;

        Ok(())
    }
}
