//! asi1-agent entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Setup identity (seeded or ephemeral)
//!   6. Build completion provider, outbox, and dispatch table
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Spawn envelope server + supervisor as components
//!   9. Register with the directory in the background
//!  10. Join components, cancel token

use tokio_util::sync::CancellationToken;
use tracing::info;

use asi1_agent::config::{self, Config};
use asi1_agent::error::AppError;
use asi1_agent::handlers::{AckHandler, SessionHandler};
use asi1_agent::identity::{self, Identity};
use asi1_agent::llm::providers;
use asi1_agent::logger;
use asi1_agent::protocol::{PROTOCOL_NAME, PROTOCOL_VERSION};
use asi1_agent::registration::{self, AgentverseDirectory};
use asi1_agent::runtime::{Component, spawn_components};
use asi1_agent::supervisor::bus::SupervisorBus;
use asi1_agent::supervisor::dispatch::MessageHandler;
use asi1_agent::supervisor::{DispatchTable, Supervisor};
use asi1_agent::transport::{EnvelopeServer, HttpOutbox};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file; a missing .env is fine.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.agent.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.agent.log_file.as_deref())?;

    info!(
        agent_name = %config.agent.name,
        configured_log_level = %config.agent.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let identity = identity::setup(config.seed_phrase.as_deref());
    info!(address = %identity.address, public_id = %identity.public_id, "agent starting");

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let outbox = HttpOutbox::new(&config.transport, identity.clone())
        .map_err(|e| AppError::Transport(e.to_string()))?;

    let handlers: Vec<Box<dyn MessageHandler>> = vec![
        Box::new(SessionHandler::new(provider.clone(), outbox, config.llm.openai.max_tokens)),
        Box::new(AckHandler),
    ];
    let table = DispatchTable::new(handlers);
    let handler_names = table.handler_names();

    let bus = SupervisorBus::new(config.transport.bus_buffer);
    let bus_handle = bus.handle.clone();

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let components: Vec<Box<dyn Component>> = vec![
        Box::new(EnvelopeServer::new(
            config.transport.bind.clone(),
            &config.agent.name,
            &identity.address,
            bus_handle,
        )),
        Box::new(Supervisor::new(bus, table)),
    ];
    let runtime = spawn_components(components, shutdown.clone());

    // Registration must not delay serving; its failure is logged only.
    let directory = AgentverseDirectory::new(&config.directory)
        .map_err(|e| AppError::Config(e.to_string()))?;
    let reg_config = config.clone();
    let reg_identity = identity.clone();
    tokio::spawn(async move {
        registration::bootstrap(&reg_config, &reg_identity, &directory).await;
    });

    print_startup_summary(&config, &identity, provider.name(), &handler_names);

    let result = runtime.join().await;
    shutdown.cancel();
    result
}

fn print_startup_summary(config: &Config, identity: &Identity, provider: &str, handlers: &[String]) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        if text.chars().count() >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let identity_line = if identity.persistent { "seeded" } else { "ephemeral (unregistered)" };
    let registration_line = if config.registration_enabled() { "enabled" } else { "skipped (missing credentials)" };
    let llm_line = format!(
        "provider={provider} model={} max_tokens={} timeout={}s",
        config.llm.openai.model, config.llm.openai.max_tokens, config.llm.openai.timeout_seconds
    );
    let key_line = if config.llm_api_key.is_some() { "api key: set" } else { "api key: missing" };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 🤖 ASI1 Agent                                                ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ {}   ║", fit(format!("name: {}", config.agent.name)));
    println!("║ {}   ║", fit(format!("address: {}", identity.address)));
    println!("║ {}   ║", fit(format!("public id: {} ({identity_line})", identity.public_id)));
    println!("║ {}   ║", fit(format!("pid: {}", std::process::id())));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ {}   ║", fit(format!("protocol: {PROTOCOL_NAME} {PROTOCOL_VERSION}")));
    println!("║ {}   ║", fit(format!("handlers: {}", handlers.join(", "))));
    println!("║ {}   ║", fit(format!("listening: {}", config.transport.bind)));
    println!("║ {}   ║", fit(format!("endpoint: {}", config.transport.endpoint_url)));
    println!("║ {}   ║", fit(format!("registration: {registration_line}")));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ {}   ║", fit(llm_line));
    println!("║ {}   ║", fit(key_line.to_string()));
    println!("╚══════════════════════════════════════════════════════════════╝");
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
                println!("Usage: asi1-agent [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
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

    //   -v     → warn
    //   -vv    → info
    //   -vvv   → debug (routing, handler registration)
    //   -vvvv+ → trace (payload dumps)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
