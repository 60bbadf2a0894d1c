// No console window when launched by the scheduler.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use terms_gate::config::Config;
use terms_gate::lockdown::platform_blocker;
use terms_gate::orchestrator::{agent_command, Mode, Orchestrator};
use terms_gate::prompt_ui::EguiPromptSurface;
use terms_gate::scheduler::SchtasksScheduler;
use terms_gate::session::{current_identity, SystemClock};
use terms_gate::store::FileAcceptanceStore;

/// Prompt agent started by the scheduled task.
#[derive(Debug, Parser)]
#[command(name = "TermsGate_Agent", version)]
struct Cli {
    /// Path to config.toml (defaults to config/config.toml next to the executable).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<AgentCommand>,
}

#[derive(Debug, clap::Subcommand)]
enum AgentCommand {
    /// Evaluate the stored acceptance and prompt if required (default).
    Run {
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[!] Configuration Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = terms_gate::logger::init(&config) {
        eprintln!("[!] Logging unavailable: {:#}", e);
    }

    let force = match cli.command {
        Some(AgentCommand::Run { force }) => force,
        None => false,
    };

    let store = FileAcceptanceStore::from_config(&config);
    let scheduler = SchtasksScheduler::new();
    let blocker = platform_blocker(&config);
    let mut surface = EguiPromptSurface::new(&config.prompt);

    let mut orchestrator = Orchestrator {
        config: &config,
        store: &store,
        scheduler: &scheduler,
        blocker: blocker.as_ref(),
        surface: &mut surface,
        clock: &SystemClock,
        identity: current_identity(),
        agent_command: agent_command(cli.config.as_deref()),
    };

    orchestrator.execute(Mode::Run { force }).exit_code()
}
