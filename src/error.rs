//! Error types shared across the crate.

use std::path::PathBuf;

/// Failure reading or writing the persisted acceptance record.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize acceptance record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("acceptance record is not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("failed to grant shared access to {path:?}: {detail}")]
    Permissions { path: PathBuf, detail: String },

    /// Raised by test stores that simulate a failing backend.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failure talking to the OS task scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to stage task definition at {path:?}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scheduler backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("no triggers selected; at least one of logon or startup is required")]
    EmptyTriggerSet,

    #[error("failed to prepare acceptance store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to register scheduled task {task}: {source}")]
    Register {
        task: String,
        #[source]
        source: SchedulerError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum UninstallError {
    #[error("failed to remove scheduled task {task}: {source}")]
    Unregister {
        task: String,
        #[source]
        source: SchedulerError,
    },

    #[error("failed to clear acceptance store: {0}")]
    Store(#[from] StoreError),
}

/// The prompt window could not be created or crashed while shown.
#[derive(Debug, thiserror::Error)]
#[error("prompt could not be presented: {0}")]
pub struct PresentationError(pub String);

/// Best-effort failures of the interaction blocker. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum BlockerError {
    #[error("failed to install keyboard hook: {0}")]
    Hook(String),

    #[error("failed to toggle taskbar visibility: {0}")]
    Taskbar(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("terms.version must not be empty")]
    EmptyTermsVersion,

    #[error("organization.{field} must not be empty")]
    EmptyIdentifier { field: &'static str },

    #[error("organization.{field} contains a path separator or reserved character: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("lockdown.blocked_keys entry {entry:?} is not a valid key chord")]
    InvalidKeyChord { entry: String },
}
