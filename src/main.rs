use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use terms_gate::config::Config;
use terms_gate::lockdown::platform_blocker;
use terms_gate::orchestrator::{agent_command, Mode, Orchestrator};
use terms_gate::prompt_ui::EguiPromptSurface;
use terms_gate::scheduler::SchtasksScheduler;
use terms_gate::session::{current_identity, SystemClock};
use terms_gate::store::FileAcceptanceStore;

/// Deploys and removes the terms acceptance prompt.
#[derive(Debug, Parser)]
#[command(name = "TermsGate", version)]
struct Cli {
    /// Path to config.toml (defaults to config/config.toml next to the executable).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register the prompt agent to run at logon and startup.
    Install,
    /// Remove the scheduled task and clear the stored acceptance.
    Uninstall,
    /// Evaluate the stored acceptance and prompt if required.
    Run {
        /// Prompt even if the current terms were already accepted.
        #[arg(long)]
        force: bool,
    },
    /// Print the stored acceptance and whether a prompt is due.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Load Configuration
    let config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[!] Configuration Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // 2. Logging
    if let Err(e) = terms_gate::logger::init(&config) {
        eprintln!("[!] Logging unavailable: {:#}", e);
    }

    let mode = match cli.command {
        Command::Install => Mode::Install,
        Command::Uninstall => Mode::Uninstall,
        Command::Run { force } => Mode::Run { force },
        Command::Status => Mode::Status,
    };

    // 3. Collaborators
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

    let result = orchestrator.execute(mode);
    if matches!(mode, Mode::Install | Mode::Uninstall) {
        println!("[*] {:?}: {:?}", mode, result);
    }
    result.exit_code()
}
