//! Deployment Orchestrator
//! Top-level dispatch over install / uninstall / run / status with a definite exit status.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::process::ExitCode;

use log::{error, info, warn};

use crate::config::{get_exe_dir, Config};
use crate::decision::{decide, Decision};
use crate::lockdown::InteractionBlocker;
use crate::scheduler::{SchedulerBinding, TaskCommand, TaskScheduler, TriggerSet};
use crate::session::{Clock, PromptSession, PromptSurface, SessionSettings};
use crate::store::AcceptanceStore;
use crate::tos_text::TermsContent;

pub const AGENT_BINARY: &str = "TermsGate_Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Install,
    Uninstall,
    Run { force: bool },
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeResult {
    Success,
    Failure,
}

impl ModeResult {
    fn from_bool(ok: bool) -> Self {
        if ok {
            ModeResult::Success
        } else {
            ModeResult::Failure
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ModeResult::Success => 0,
            ModeResult::Failure => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

pub struct Orchestrator<'a> {
    pub config: &'a Config,
    pub store: &'a dyn AcceptanceStore,
    pub scheduler: &'a dyn TaskScheduler,
    pub blocker: &'a dyn InteractionBlocker,
    pub surface: &'a mut dyn PromptSurface,
    pub clock: &'a dyn Clock,
    pub identity: String,
    /// What the scheduled task runs.
    pub agent_command: TaskCommand,
}

impl Orchestrator<'_> {
    /// Never panics past this point; internal faults become `Failure`.
    pub fn execute(&mut self, mode: Mode) -> ModeResult {
        info!("Starting in {:?} mode", mode);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(mode)));
        match result {
            Ok(ok) => {
                let result = ModeResult::from_bool(ok);
                info!("{:?} finished: {:?}", mode, result);
                result
            }
            Err(payload) => {
                error!("Internal error in {:?} mode: {}", mode, panic_message(&*payload));
                ModeResult::Failure
            }
        }
    }

    fn dispatch(&mut self, mode: Mode) -> bool {
        match mode {
            Mode::Install => self.install(),
            Mode::Uninstall => self.uninstall(),
            Mode::Run { force } => self.run(force),
            Mode::Status => self.status(),
        }
    }

    fn binding(&self) -> SchedulerBinding<'_> {
        SchedulerBinding::new(
            self.scheduler,
            self.store,
            self.config.task_name(),
            format!(
                "Shows the {} until it is accepted",
                self.config.terms.title
            ),
        )
    }

    fn install(&self) -> bool {
        let triggers = TriggerSet::from_config(&self.config.prompt);
        match self.binding().install(triggers, self.agent_command.clone()) {
            Ok(()) => true,
            Err(e) => {
                error!("Install failed: {}", e);
                false
            }
        }
    }

    fn uninstall(&self) -> bool {
        match self.binding().uninstall() {
            Ok(()) => true,
            Err(e) => {
                error!("Uninstall failed: {}", e);
                false
            }
        }
    }

    fn run(&mut self, force: bool) -> bool {
        // Undo anything a killed session left behind.
        if let Err(e) = self.blocker.resume() {
            warn!("Could not restore desktop interaction at startup: {}", e);
        }

        let record = self.store.read();
        let version = &self.config.terms.version;
        let reason = match decide(record.as_ref(), version, force) {
            Decision::AlreadyAccepted => {
                info!("Terms version {} already accepted; nothing to do", version);
                return true;
            }
            Decision::MustPrompt(reason) => reason,
        };
        info!("Prompt required: {}", reason);

        let content = match TermsContent::load(self.config) {
            Ok(content) => content,
            Err(e) => {
                error!("Cannot load terms content: {:#}", e);
                return false;
            }
        };

        let settings = SessionSettings {
            terms_version: version.clone(),
            max_dismissals: self.config.prompt.max_dismissals,
            identity: self.identity.clone(),
        };
        let mut session = PromptSession::new(
            settings,
            self.store,
            &mut *self.surface,
            self.blocker,
            self.clock,
        );
        session.run(&content).accepted()
    }

    fn status(&self) -> bool {
        let record = self.store.read();
        let decision = decide(record.as_ref(), &self.config.terms.version, false);
        let report = serde_json::json!({
            "termsVersion": self.config.terms.version,
            "taskName": self.config.task_name(),
            "mustPrompt": decision.must_prompt(),
            "record": record,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => {
                println!("{}", text);
                true
            }
            Err(e) => {
                error!("Failed to render status: {}", e);
                false
            }
        }
    }
}

/// The scheduled command: the agent binary next to this executable.
pub fn agent_command(config_path: Option<&Path>) -> TaskCommand {
    let file_name = if cfg!(windows) {
        format!("{}.exe", AGENT_BINARY)
    } else {
        AGENT_BINARY.to_string()
    };

    let mut args = vec!["run".to_string()];
    if let Some(path) = config_path {
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        args.push("--config".to_string());
        args.push(absolute.to_string_lossy().into_owned());
    }

    TaskCommand {
        program: get_exe_dir().join(file_name),
        args,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
