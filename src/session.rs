//! Prompt Session
//! Drives a single interactive acceptance attempt: `Idle → Presenting → {Accepted, Blocked}`.

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::decision::{prompt_policy, PromptPolicy};
use crate::error::PresentationError;
use crate::lockdown::{InteractionBlocker, LockdownGuard};
use crate::record::AcceptanceRecord;
use crate::store::AcceptanceStore;
use crate::tos_text::TermsContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Accept,
    /// "Remind me later"; only offered while the policy is dismissible.
    Dismiss,
    /// The window went away without a decision.
    Closed,
}

pub struct PromptRequest<'a> {
    pub content: &'a TermsContent,
    pub policy: PromptPolicy,
}

/// The window the user interacts with. `present` blocks until the user acts.
pub trait PromptSurface {
    fn present(&mut self, request: &PromptRequest<'_>) -> Result<UserAction, PresentationError>;
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Dismissed,
    NoDecision,
    StoreFailed,
    PresentationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Accepted,
    Blocked(BlockReason),
}

impl SessionOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, SessionOutcome::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Presenting,
    Accepted,
    Blocked(BlockReason),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub terms_version: String,
    pub max_dismissals: u32,
    pub identity: String,
}

pub struct PromptSession<'a> {
    settings: SessionSettings,
    store: &'a dyn AcceptanceStore,
    surface: &'a mut dyn PromptSurface,
    blocker: &'a dyn InteractionBlocker,
    clock: &'a dyn Clock,
    state: SessionState,
}

impl<'a> PromptSession<'a> {
    pub fn new(
        settings: SessionSettings,
        store: &'a dyn AcceptanceStore,
        surface: &'a mut dyn PromptSurface,
        blocker: &'a dyn InteractionBlocker,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            settings,
            store,
            surface,
            blocker,
            clock,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run(&mut self, content: &TermsContent) -> SessionOutcome {
        if self.state != SessionState::Idle {
            warn!("Prompt session re-entered in state {:?}; refusing", self.state);
            return SessionOutcome::Blocked(BlockReason::NoDecision);
        }

        let previous = self.store.read();
        let policy = prompt_policy(previous.as_ref(), self.settings.max_dismissals);
        info!(
            "Presenting terms version {} ({:?})",
            self.settings.terms_version, policy
        );
        self.state = SessionState::Presenting;

        let outcome = {
            let _lockdown = LockdownGuard::acquire(self.blocker);
            self.present_until_decided(content, policy, previous.as_ref())
        };

        self.state = match outcome {
            SessionOutcome::Accepted => SessionState::Accepted,
            SessionOutcome::Blocked(reason) => SessionState::Blocked(reason),
        };
        info!("Prompt session finished: {:?}", outcome);
        outcome
    }

    fn present_until_decided(
        &mut self,
        content: &TermsContent,
        policy: PromptPolicy,
        previous: Option<&AcceptanceRecord>,
    ) -> SessionOutcome {
        let request = PromptRequest { content, policy };
        loop {
            match self.surface.present(&request) {
                Ok(UserAction::Accept) => return self.record_acceptance(previous),
                Ok(UserAction::Dismiss) if policy.allows_dismiss() => {
                    self.record_reminder(previous);
                    return SessionOutcome::Blocked(BlockReason::Dismissed);
                }
                Ok(UserAction::Dismiss) => {
                    warn!("Dismiss requested but the prompt is mandatory; presenting again");
                }
                Ok(UserAction::Closed) => {
                    self.record_reminder(previous);
                    return SessionOutcome::Blocked(BlockReason::NoDecision);
                }
                Err(e) => {
                    error!("{}", e);
                    return SessionOutcome::Blocked(BlockReason::PresentationFailed);
                }
            }
        }
    }

    fn record_acceptance(&self, previous: Option<&AcceptanceRecord>) -> SessionOutcome {
        let record = AcceptanceRecord::accepted_now(
            previous,
            &self.settings.terms_version,
            &self.settings.identity,
            self.clock.now(),
        );
        match self.store.write(&record) {
            Ok(()) => {
                info!(
                    "Terms version {} accepted by {} (acceptance #{})",
                    record.accepted_terms_version,
                    record.accepted_by_identity,
                    record.acceptance_count
                );
                SessionOutcome::Accepted
            }
            Err(e) => {
                error!("User accepted but the acceptance could not be recorded: {}", e);
                SessionOutcome::Blocked(BlockReason::StoreFailed)
            }
        }
    }

    fn record_reminder(&self, previous: Option<&AcceptanceRecord>) {
        let record = AcceptanceRecord::reminded_now(previous, self.clock.now());
        match self.store.write(&record) {
            Ok(()) => info!("Prompt ended without acceptance (reminder #{})", record.reminder_count),
            Err(e) => warn!("Failed to record reminder: {}", e),
        }
    }
}

/// Executing principal, `DOMAIN\user` where a domain is known.
pub fn current_identity() -> String {
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    match std::env::var("USERDOMAIN") {
        Ok(domain) if !domain.is_empty() => format!("{}\\{}", domain, user),
        _ => user,
    }
}
