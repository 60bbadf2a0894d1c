//! TermsGate: a mandatory terms-acceptance prompt that reschedules itself at
//! logon and startup until the current terms version has been accepted.

pub mod config;
pub mod decision;
pub mod error;
pub mod keys;
pub mod lockdown;
pub mod logger;
pub mod orchestrator;
pub mod prompt_ui;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod tos_text;

pub use decision::{decide, Decision};
pub use orchestrator::{Mode, ModeResult, Orchestrator};
pub use record::AcceptanceRecord;
pub use store::{AcceptanceStore, FileAcceptanceStore};
