//! chatkeep — console LLM chat with a persisted transcript.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve and validate the effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Spawn Ctrl-C → shutdown signal watcher
//!   6. Print status
//!   7. Start the stdin reader thread
//!   8. Run the supervisor: load memory → chat → (crash report) → save memory

use chatkeep::config::{self, Config};
use chatkeep::error::AppError;
use chatkeep::logger;
use chatkeep::subsystems::crash::CrashLog;
use chatkeep::subsystems::memory::MemoryStore;
use chatkeep::subsystems::session::{ConsoleInput, ConsoleSession, SessionSettings};
use chatkeep::supervisor::{RunOutcome, Supervisor};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();
    logger::parse_level(effective_log_level)?;

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        api_base = %config.llm.api_base,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    // First Ctrl-C ends the chat loop and the supervisor still saves memory.
    // A second one exits at once.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — ending session");
            ctrlc_token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second ctrl-c — exiting without saving");
            std::process::exit(130);
        }
    });

    let memory = MemoryStore::in_working_dir();
    let crash_log = CrashLog::in_working_dir();

    print_startup_summary(&config, &memory, &crash_log);

    let input = ConsoleInput::stdin()?;
    let mut session =
        ConsoleSession::stdio(SessionSettings::from_config(&config), input.clone(), shutdown);
    let mut supervisor = Supervisor::new(memory, crash_log, input);

    let report = supervisor.run(&mut session).await?;
    info!(
        outcome = ?report.outcome,
        messages = report.transcript.len(),
        "run finished"
    );
    if report.outcome == RunOutcome::Completed {
        println!("Bye :) ...");
    }

    Ok(())
}

fn print_startup_summary(config: &Config, memory: &MemoryStore, crash_log: &CrashLog) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 59;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };
    let on_off = |b: bool| if b { "on" } else { "off" };

    let key_status = if config.llm_api_key.is_some() { "set" } else { "not set (LLM_API_KEY)" };

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║ {}║", fit("chatkeep".to_string()));
    println!("╟────────────────────────────────────────────────────────────╢");
    println!("║ {}║", fit(format!("provider: {}", config.llm.provider)));
    println!("║ {}║", fit(format!("endpoint: {}", config.llm.api_base)));
    println!("║ {}║", fit(format!("model:    {}", config.llm.model)));
    println!("║ {}║", fit(format!("api key:  {key_status}")));
    println!(
        "║ {}║",
        fit(format!(
            "context:  {} tokens, replies up to {}",
            config.llm.context_window, config.llm.max_tokens
        ))
    );
    println!(
        "║ {}║",
        fit(format!(
            "auto-run: {}  offline: {}",
            on_off(config.interpreter.auto_run),
            on_off(config.interpreter.offline)
        ))
    );
    println!("╟────────────────────────────────────────────────────────────╢");
    println!("║ {}║", fit(format!("memory:    {}", memory.path().display())));
    println!("║ {}║", fit(format!("crash log: {}", crash_log.path().display())));
    println!("╚════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: chatkeep [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!(
                    "  -f, --config <PATH>        Path to configuration file (default: {})",
                    config::DEFAULT_CONFIG_PATH
                );
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment:");
                println!("  LLM_API_KEY                API key for the LLM endpoint");
                println!("  CHATKEEP_LOG_LEVEL         Overrides the configured log level");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (request metadata, state transitions)
    //   -vvvv+  → trace  (full payload dumps)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
