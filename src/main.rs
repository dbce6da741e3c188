// ABOUTME: Main entry point for the jarvis WhatsApp assistant
// ABOUTME: Initializes logging and config, then runs the webhook server or a one-off agent job

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jarvis::{
    config::Config,
    metrics, paths, store, tasks,
    voice::OpenAiTranscriber,
    webhook::{self, WebhookState},
    whatsapp::WhatsAppClient,
};
use jarvis_agent::backends::claude_cli::RECIPIENT_ENV;
use jarvis_agent::backends::{ClaudeCliConfig, ClaudeCliInvoker};
use jarvis_core::{
    outbound, MessageArchive, Orchestrator, OrchestratorConfig, RestartSignal, SessionRegistry,
    UserDispatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jarvis", version, about = "WhatsApp assistant backed by the Claude CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (the default)
    Serve,
    /// Send a message to $JARVIS_CHAT_RECIPIENT and archive it
    Send {
        #[arg(long)]
        text: String,
    },
    /// Run a scheduled task through the agent
    Task { name: String, description: String },
    /// Let the agent decide whether to reach out to the owner
    Checkin,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! jarvis crashed with the following error:         ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let command = cli.command.unwrap_or(Command::Serve);
    // Only the long-running server writes log files
    let log_dir = matches!(command, Command::Serve).then(|| paths::log_dir(&config.data_dir()));
    let guard = init_tracing(log_dir.as_deref());

    match command {
        Command::Serve => {
            serve(config).await?;
            tracing::info!("Exiting for restart");
            drop(guard);
            std::process::exit(0);
        }
        Command::Send { text } => send(&config, &text).await,
        Command::Task { name, description } => {
            let invoker = ClaudeCliInvoker::new(claude_config(&config));
            let outcome = tasks::run_scheduled_task(
                &invoker,
                &name,
                &description,
                config.user.phone_number.clone(),
            )
            .await?;
            println!("Task '{}' {}", name, outcome);
            Ok(())
        }
        Command::Checkin => {
            let invoker = ClaudeCliInvoker::new(claude_config(&config));
            let outcome = tasks::run_checkin(&invoker, config.user.phone_number.clone()).await?;
            if outcome.conversation_started {
                println!("Check-in complete (conversation started via send-message skill)");
            } else {
                println!("Check-in complete (no conversation started or chose silence)");
            }
            Ok(())
        }
    }
}

/// Stderr logging always; a daily rolling file as well when `log_dir` is given
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let appender = log_dir.map(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("jarvis")
            .filename_suffix("log")
            .build(dir)
    });
    let (file_layer, guard, file_error) = match appender {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "File logging disabled");
    }
    guard
}

fn claude_config(config: &Config) -> ClaudeCliConfig {
    ClaudeCliConfig {
        binary: config.agent.binary.clone(),
        working_dir: PathBuf::from(&config.agent.working_dir),
    }
}

/// Run the webhook server until the agent asks for a restart and every turn has drained
async fn serve(config: Config) -> Result<()> {
    config.whatsapp.require_credentials()?;
    let timezone = config.timezone()?;
    let data_dir = config.data_dir();

    tracing::info!(
        data_dir = %data_dir.display(),
        host = %config.server.host,
        port = config.server.port,
        timezone = %timezone,
        working_dir = %config.agent.working_dir,
        "Starting jarvis"
    );

    let db = store::open(&paths::database_file(&data_dir))?;
    let archive = MessageArchive::new(db.clone());
    match archive.prune_older_than(config.retention()) {
        Ok(0) => {}
        Ok(pruned) => tracing::info!(pruned, "Pruned archived messages past retention"),
        Err(e) => tracing::warn!(error = %e, "Failed to prune message archive"),
    }
    let sessions = SessionRegistry::new(db);

    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, voice messages will fail to transcribe");
    }
    let whatsapp = Arc::new(WhatsAppClient::new(config.whatsapp.clone())?);
    let transcriber = Arc::new(OpenAiTranscriber::new(&config.openai)?);
    let invoker = Arc::new(ClaudeCliInvoker::new(claude_config(&config)));
    let restart = RestartSignal::new();

    let orchestrator = Arc::new(Orchestrator::new(
        whatsapp.clone(),
        transcriber,
        invoker,
        archive,
        sessions,
        UserDispatcher::new(),
        restart.clone(),
        OrchestratorConfig {
            platform: config.agent.platform.clone(),
            timezone,
            turn_timeout: None,
        },
    ));

    let metrics_handle =
        metrics::init_metrics().context("Failed to initialize Prometheus metrics")?;
    let app = webhook::router(
        WebhookState {
            orchestrator: Arc::clone(&orchestrator),
            whatsapp,
        },
        Some(metrics_handle),
    );

    // The server only stops when a restart is requested
    let shutdown = restart.clone();
    webhook::start_webhook_server(&config.server, app, async move {
        shutdown.requested().await;
    })
    .await?;

    tracing::info!("Restart requested, waiting for in-flight turns to finish");
    orchestrator.drain().await;
    Ok(())
}

async fn send(config: &Config, text: &str) -> Result<()> {
    let recipient = std::env::var(RECIPIENT_ENV)
        .ok()
        .filter(|r| !r.is_empty())
        .with_context(|| format!("{} not set", RECIPIENT_ENV))?;
    config.whatsapp.require_credentials()?;

    let db = store::open(&paths::database_file(&config.data_dir()))?;
    let archive = MessageArchive::new(db);
    let whatsapp = WhatsAppClient::new(config.whatsapp.clone())?;

    let message_id = outbound::send_archived(&whatsapp, &archive, &recipient, text).await?;
    println!("{}", message_id);
    Ok(())
}
