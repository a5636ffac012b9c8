mod api;
mod config;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use apibot_channels::messenger::{self, DEFAULT_GRAPH_URL};
use apibot_channels::{ConsoleDelivery, MessengerAdapter, MessengerConfig, PlainAdapter, WebhookState};
use apibot_commands::{CommandDispatcher, DispatchOutcome, SkipReason, SlashParser};
use apibot_config::MessengerSection;
use apibot_core::RequestAdapter;
use apibot_logging::init_logger;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use api::AppState;
use config::Runtime;

#[derive(Parser)]
#[command(name = "apibot")]
#[command(about = "apibot: chat commands answered from HTTP APIs")]
#[command(version)]
struct Cli {
    /// Config file (default: $APIBOT_CONFIG_DIR/config.yaml or ~/.apibot/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Messenger webhook server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dispatch a recorded event and print the replies
    Run {
        /// Event JSON file, or `-` for stdin
        event: String,
        /// Treat the event as a Messenger webhook payload
        #[arg(long)]
        messenger: bool,
    },
    /// Dispatch one command line, e.g. `apibot ask /country singapore`
    Ask {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Validate the config and compile every command template
    Check,
    /// List registered commands
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config::config_path(cli.config);
    let (settings, report) = config::load_settings(&path).await?;

    let log_dir = settings.logging.dir.as_deref().map(Path::new);
    let _log_guard = init_logger(&settings.logging.level, log_dir);
    info!(path = %path.display(), commands = settings.commands.len(), "Loaded config");
    if !matches!(cli.command, Commands::Check) {
        report.log();
    }

    let runtime = Runtime::build(settings, report)?;

    match cli.command {
        Commands::Serve { port } => run_server(runtime, port).await,
        Commands::Run { event, messenger } => {
            let raw = read_event(&event).await?;
            let event: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Event is not valid JSON: {event}"))?;
            let source: Arc<dyn RequestAdapter> = if messenger {
                Arc::new(messenger_adapter(&runtime, runtime.config.messenger.as_ref()))
            } else {
                Arc::new(PlainAdapter)
            };
            dispatch_to_console(&runtime, source, &event).await
        }
        Commands::Ask { text } => {
            let event = Value::String(text.join(" "));
            dispatch_to_console(&runtime, Arc::new(PlainAdapter), &event).await
        }
        Commands::Check => check(&runtime, &path),
        Commands::List => {
            list(&runtime);
            Ok(())
        }
    }
}

async fn run_server(runtime: Runtime, port: Option<u16>) -> Result<()> {
    let Some(section) = runtime.config.messenger.as_ref() else {
        bail!("`serve` needs a `messenger` section with access_token and verify_token");
    };
    if !runtime.report.is_valid() {
        bail!("Config has {} error(s); run `apibot check`", runtime.report.errors.len());
    }

    let server = &runtime.config.server;
    let addr = format!("{}:{}", server.bind_address, port.unwrap_or(server.port));
    info!(
        addr = %addr,
        webhook = %server.webhook_path,
        commands = runtime.registry.len(),
        "Starting apibot"
    );

    let adapter = Arc::new(messenger_adapter(&runtime, Some(section)));
    let dispatcher = CommandDispatcher::new(adapter.clone(), Arc::new(SlashParser), adapter.clone())
        .with_max_concurrent_jobs(runtime.config.http.max_concurrent_jobs);
    let webhook = messenger::build_router(
        &server.webhook_path,
        WebhookState {
            adapter,
            dispatcher: Arc::new(dispatcher),
            registry: Arc::clone(&runtime.registry),
        },
    );

    let app_state = Arc::new(AppState {
        registry: Arc::clone(&runtime.registry),
    });
    let app = api::build_router(app_state, Some(webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn messenger_adapter(runtime: &Runtime, section: Option<&MessengerSection>) -> MessengerAdapter {
    let config = match section {
        Some(s) => MessengerConfig {
            access_token: s.access_token.clone(),
            verify_token: s.verify_token.clone(),
            graph_url: s.graph_url.clone(),
        },
        // Only inbound parsing is used without credentials.
        None => MessengerConfig {
            access_token: String::new(),
            verify_token: String::new(),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
        },
    };
    MessengerAdapter::with_client(config, runtime.client.clone())
}

async fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read event from stdin")?;
        return Ok(raw);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read event file: {source}"))
}

async fn dispatch_to_console(
    runtime: &Runtime,
    source: Arc<dyn RequestAdapter>,
    event: &Value,
) -> Result<()> {
    let dispatcher = CommandDispatcher::new(source, Arc::new(SlashParser), Arc::new(ConsoleDelivery))
        .with_max_concurrent_jobs(runtime.config.http.max_concurrent_jobs);
    let outcome = dispatcher.exec(event, &runtime.registry).await?;
    report_skipped(&outcome);
    if outcome.jobs.is_empty() && outcome.skipped.is_empty() {
        output::note_warn("Event contained no command requests");
    }
    Ok(())
}

fn report_skipped(outcome: &DispatchOutcome) {
    for skipped in &outcome.skipped {
        match &skipped.reason {
            SkipReason::NoCommand => {
                output::note_warn(&format!("[{}] message has no text", skipped.sender_id))
            }
            SkipReason::UnknownCommand(cmd) => output::note_warn(&format!(
                "[{}] unknown command `{cmd}`; see `apibot list`",
                skipped.sender_id
            )),
        }
    }
}

fn check(runtime: &Runtime, path: &Path) -> Result<()> {
    for warning in &runtime.report.warnings {
        output::note_warn(&format!("{}: {}", warning.path, warning.message));
    }
    let mut errors = runtime.report.errors.len();
    for error in &runtime.report.errors {
        output::note_error(&format!("{}: {}", error.path, error.message));
    }
    for renderer in runtime.registry.renderers() {
        for e in renderer.compile_errors() {
            output::note_error(&e.to_string());
            errors += 1;
        }
    }

    if errors > 0 {
        bail!("{errors} problem(s) in {}", path.display());
    }
    output::note_success(&format!(
        "{} is valid ({} command(s))",
        path.display(),
        runtime.registry.len()
    ));
    Ok(())
}

fn list(runtime: &Runtime) {
    let rows: Vec<Vec<String>> = runtime
        .registry
        .commands()
        .into_iter()
        .map(|c| vec![c.cmd, c.args.join(" "), c.description.unwrap_or_default()])
        .collect();
    if rows.is_empty() {
        output::note_warn("No commands configured");
        return;
    }
    print!("{}", output::render_table(&["COMMAND", "ARGS", "DESCRIPTION"], &rows));
}
