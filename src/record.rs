//! Acceptance Record
//! The persisted acceptance state for one machine and the two events that rewrite it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceRecord {
    pub accepted: bool,
    #[serde(default)]
    pub accepted_terms_version: String,
    #[serde(default)]
    pub acceptance_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_by_identity: String,
    #[serde(default)]
    pub acceptance_count: u32,
    #[serde(default)]
    pub reminder_count: u32,
    #[serde(default)]
    pub last_reminder_timestamp: Option<DateTime<Utc>>,
}

impl AcceptanceRecord {
    /// Record for an acceptance event on top of `previous`.
    pub fn accepted_now(
        previous: Option<&AcceptanceRecord>,
        terms_version: &str,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let prior_count = previous.map(|r| r.acceptance_count).unwrap_or(0);
        Self {
            accepted: true,
            accepted_terms_version: terms_version.to_string(),
            acceptance_timestamp: Some(now),
            accepted_by_identity: identity.to_string(),
            acceptance_count: prior_count.saturating_add(1),
            reminder_count: 0,
            last_reminder_timestamp: previous.and_then(|r| r.last_reminder_timestamp),
        }
    }

    /// Record for a prompt that ended without acceptance.
    ///
    /// Earlier acceptance details are kept as history, but `accepted` is cleared
    /// because the record reflects the most recent session.
    pub fn reminded_now(previous: Option<&AcceptanceRecord>, now: DateTime<Utc>) -> Self {
        let base = previous.cloned().unwrap_or_default();
        Self {
            accepted: false,
            reminder_count: base.reminder_count.saturating_add(1),
            last_reminder_timestamp: Some(now),
            ..base
        }
    }

    /// An accepted record must name the version and time it was accepted.
    pub fn is_consistent(&self) -> bool {
        !self.accepted
            || (!self.accepted_terms_version.trim().is_empty()
                && self.acceptance_timestamp.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn first_acceptance_starts_the_count() {
        let record = AcceptanceRecord::accepted_now(None, "3.3.0", "CORP\\alice", at(9));
        assert!(record.accepted);
        assert_eq!(record.accepted_terms_version, "3.3.0");
        assert_eq!(record.acceptance_timestamp, Some(at(9)));
        assert_eq!(record.accepted_by_identity, "CORP\\alice");
        assert_eq!(record.acceptance_count, 1);
        assert_eq!(record.reminder_count, 0);
        assert!(record.is_consistent());
    }

    #[test]
    fn acceptance_resets_reminders_and_increments_once() {
        let previous = AcceptanceRecord {
            accepted: false,
            accepted_terms_version: "3.2.0".into(),
            acceptance_timestamp: Some(at(1)),
            accepted_by_identity: "bob".into(),
            acceptance_count: 4,
            reminder_count: 2,
            last_reminder_timestamp: Some(at(5)),
        };
        let record = AcceptanceRecord::accepted_now(Some(&previous), "3.3.0", "alice", at(9));
        assert_eq!(record.acceptance_count, 5);
        assert_eq!(record.reminder_count, 0);
        assert_eq!(record.last_reminder_timestamp, Some(at(5)));
    }

    #[test]
    fn reminder_keeps_history_but_clears_accepted() {
        let previous = AcceptanceRecord::accepted_now(None, "3.2.0", "alice", at(1));
        let record = AcceptanceRecord::reminded_now(Some(&previous), at(7));
        assert!(!record.accepted);
        assert_eq!(record.accepted_terms_version, "3.2.0");
        assert_eq!(record.acceptance_count, 1);
        assert_eq!(record.reminder_count, 1);
        assert_eq!(record.last_reminder_timestamp, Some(at(7)));

        let again = AcceptanceRecord::reminded_now(Some(&record), at(8));
        assert_eq!(again.reminder_count, 2);
        assert_eq!(again.acceptance_count, 1);
    }

    #[test]
    fn reminder_without_history() {
        let record = AcceptanceRecord::reminded_now(None, at(3));
        assert!(!record.accepted);
        assert_eq!(record.acceptance_count, 0);
        assert_eq!(record.reminder_count, 1);
        assert!(record.is_consistent());
    }

    #[test]
    fn accepted_without_version_is_inconsistent() {
        let record = AcceptanceRecord {
            accepted: true,
            acceptance_timestamp: Some(at(1)),
            ..Default::default()
        };
        assert!(!record.is_consistent());

        let record = AcceptanceRecord {
            accepted: true,
            accepted_terms_version: "1.0".into(),
            ..Default::default()
        };
        assert!(!record.is_consistent());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = AcceptanceRecord::accepted_now(None, "3.3.0", "alice", at(9));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["acceptedTermsVersion"], "3.3.0");
        assert_eq!(json["acceptanceCount"], 1);
        assert_eq!(json["reminderCount"], 0);
        assert!(json["lastReminderTimestamp"].is_null());
    }
}
