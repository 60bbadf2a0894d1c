//! Acceptance decision.
//!
//! `decide` is the only gate on whether a prompt is shown. The reminder counter
//! never changes its outcome; it only controls whether the dialog may be
//! dismissed for now (see [`prompt_policy`]).

use std::fmt;

use crate::record::AcceptanceRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AlreadyAccepted,
    MustPrompt(PromptReason),
}

impl Decision {
    pub fn must_prompt(&self) -> bool {
        matches!(self, Decision::MustPrompt(_))
    }
}

/// Why a prompt is required. Used for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReason {
    Forced,
    NoRecord,
    NotAccepted,
    TermsChanged { accepted: String },
}

impl fmt::Display for PromptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptReason::Forced => write!(f, "forced re-prompt"),
            PromptReason::NoRecord => write!(f, "no acceptance on record"),
            PromptReason::NotAccepted => write!(f, "most recent prompt was not accepted"),
            PromptReason::TermsChanged { accepted } => {
                write!(f, "terms changed since version {} was accepted", accepted)
            }
        }
    }
}

pub fn decide(
    record: Option<&AcceptanceRecord>,
    current_terms_version: &str,
    force: bool,
) -> Decision {
    if force {
        return Decision::MustPrompt(PromptReason::Forced);
    }
    let Some(record) = record else {
        return Decision::MustPrompt(PromptReason::NoRecord);
    };
    if !record.accepted {
        return Decision::MustPrompt(PromptReason::NotAccepted);
    }
    if record.accepted_terms_version != current_terms_version {
        return Decision::MustPrompt(PromptReason::TermsChanged {
            accepted: record.accepted_terms_version.clone(),
        });
    }
    Decision::AlreadyAccepted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPolicy {
    /// A "remind me later" action is offered; `remaining` dismissals are left
    /// including the one this prompt may consume.
    Dismissible { remaining: u32 },
    Mandatory,
}

impl PromptPolicy {
    pub fn allows_dismiss(&self) -> bool {
        matches!(self, PromptPolicy::Dismissible { .. })
    }
}

/// Dismissals are counted by `reminder_count`, which resets on acceptance.
pub fn prompt_policy(record: Option<&AcceptanceRecord>, max_dismissals: u32) -> PromptPolicy {
    let used = record.map(|r| r.reminder_count).unwrap_or(0);
    match max_dismissals.checked_sub(used) {
        Some(remaining) if remaining > 0 => PromptPolicy::Dismissible { remaining },
        _ => PromptPolicy::Mandatory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn accepted(version: &str) -> AcceptanceRecord {
        AcceptanceRecord::accepted_now(
            None,
            version,
            "alice",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn records() -> Vec<Option<AcceptanceRecord>> {
        let mut not_accepted = accepted("3.3.0");
        not_accepted.accepted = false;
        vec![
            None,
            Some(AcceptanceRecord::default()),
            Some(not_accepted),
            Some(accepted("3.3.0")),
            Some(accepted("3.2.0")),
            Some(accepted("")),
        ]
    }

    #[test]
    fn absent_or_unaccepted_always_prompts() {
        for record in records() {
            if record.as_ref().map(|r| r.accepted).unwrap_or(false) {
                continue;
            }
            assert!(decide(record.as_ref(), "3.3.0", false).must_prompt(), "{:?}", record);
        }
        assert_eq!(
            decide(None, "3.3.0", false),
            Decision::MustPrompt(PromptReason::NoRecord)
        );
    }

    #[test]
    fn accepted_current_version_is_already_accepted() {
        let record = accepted("3.3.0");
        assert_eq!(decide(Some(&record), "3.3.0", false), Decision::AlreadyAccepted);
    }

    #[test]
    fn acceptance_never_expires_with_age() {
        let mut record = accepted("3.3.0");
        record.acceptance_timestamp = Some(Utc::now() - Duration::days(3650));
        assert_eq!(decide(Some(&record), "3.3.0", false), Decision::AlreadyAccepted);
    }

    #[test]
    fn changed_version_prompts_regardless_of_age() {
        let mut record = accepted("3.2.0");
        record.acceptance_timestamp = Some(Utc::now());
        assert_eq!(
            decide(Some(&record), "3.3.0", false),
            Decision::MustPrompt(PromptReason::TermsChanged {
                accepted: "3.2.0".to_string()
            })
        );
    }

    #[test]
    fn version_comparison_is_exact() {
        let record = accepted("3.3");
        assert!(decide(Some(&record), "3.3.0", false).must_prompt());
    }

    #[test]
    fn force_always_prompts() {
        for record in records() {
            assert_eq!(
                decide(record.as_ref(), "3.3.0", true),
                Decision::MustPrompt(PromptReason::Forced)
            );
        }
    }

    #[test]
    fn reminders_do_not_change_the_decision() {
        let mut record = accepted("3.3.0");
        record.reminder_count = 99;
        assert_eq!(decide(Some(&record), "3.3.0", false), Decision::AlreadyAccepted);
    }

    #[test]
    fn policy_counts_down_dismissals() {
        let mut record = AcceptanceRecord::default();
        assert_eq!(
            prompt_policy(None, 3),
            PromptPolicy::Dismissible { remaining: 3 }
        );

        record.reminder_count = 2;
        assert_eq!(
            prompt_policy(Some(&record), 3),
            PromptPolicy::Dismissible { remaining: 1 }
        );

        record.reminder_count = 3;
        assert_eq!(prompt_policy(Some(&record), 3), PromptPolicy::Mandatory);

        record.reminder_count = 7;
        assert_eq!(prompt_policy(Some(&record), 3), PromptPolicy::Mandatory);
    }

    #[test]
    fn zero_max_dismissals_is_always_mandatory() {
        assert_eq!(prompt_policy(None, 0), PromptPolicy::Mandatory);
        assert!(!PromptPolicy::Mandatory.allows_dismiss());
    }
}
