use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL};
use configuration::logging::init_tracing;
use configuration::{Config, CredentialStore, FileCredentialStore, load_config};
use core_types::Credential;
use engine::SessionEngine;
use events::{ClientEvent, DetectionNotice, LogLevel, LogMessage};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// The main entry point for the klinewatch market-data client.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Credentials(args) => handle_credentials(args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Streams filter matches from a kline detection server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and print events until Ctrl-C.
    Run(RunArgs),
    /// Inspect or change the stored credential.
    Credentials(CredentialsArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `server.base_url`.
    #[arg(long)]
    server: Option<String>,

    /// Print every event as one JSON line instead of human-readable output.
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct CredentialsArgs {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    action: CredentialsAction,
}

#[derive(Subcommand)]
enum CredentialsAction {
    /// Print the stored credential.
    Show,
    /// Delete the stored credential; the next run registers a new user.
    Reset,
    /// Store a known credential.
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
        /// Stored for interactive clients sharing the file; this client always logs in.
        #[arg(long)]
        auto_login: bool,
    },
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    config.validate()?;
    let _log_guard = init_tracing(&config.logging)?;

    let store = FileCredentialStore::new(config.credentials.path.clone());
    let (engine, handle) = SessionEngine::new(&config, store)?;

    let printer = tokio::spawn(render_events(handle.subscribe(), args.json));

    let shutdown = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received; shutting down.");
            if let Err(e) = shutdown.shutdown().await {
                tracing::warn!(error = %e, "Engine already stopped.");
            }
        }
    });

    let result = engine.run().await;

    // Release every event sender so the printer drains and exits.
    ctrl_c.abort();
    drop(handle);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer ended abnormally.");
    }

    result?;
    Ok(())
}

async fn render_events(mut events: broadcast::Receiver<ClientEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) if json => match event.to_json() {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Could not encode event."),
            },
            Ok(event) => render_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event output fell behind; some events were not printed.");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_event(event: &ClientEvent) {
    match event {
        ClientEvent::Log(message) => render_log(message),
        ClientEvent::Detection(notice) => println!("{}", detection_table(notice)),
        ClientEvent::SessionActive { session_id, user } => {
            println!("Session {session_id} active for user {user}.");
        }
        ClientEvent::CatalogUpdated { exchanges, symbols } => {
            println!("Catalog: {exchanges} exchanges, {symbols} symbols.");
        }
    }
}

fn render_log(message: &LogMessage) {
    let level = match message.level {
        LogLevel::Info => "INFO ",
        LogLevel::Warn => "WARN ",
        LogLevel::Error => "ERROR",
    };
    println!(
        "{} {} {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        level,
        message.message
    );
}

fn detection_table(notice: &DetectionNotice) -> Table {
    let direction = if notice.rising {
        Cell::new("UP").fg(Color::Green)
    } else {
        Cell::new("DOWN").fg(Color::Red)
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Exchange", "Symbol", "Interval", "Delta %", "Volume", "Move", "Bars"]);
    table.add_row(vec![
        Cell::new(notice.id),
        Cell::new(&notice.exchange),
        Cell::new(&notice.symbol),
        Cell::new(&notice.interval),
        Cell::new(format!("{:.2}", notice.delta)),
        Cell::new(format!("{:.0}", notice.volume)),
        direction,
        Cell::new(format!("{}/{}", notice.bars, notice.review_bars)),
    ]);
    table
}

// ==============================================================================
// Credentials Command Logic
// ==============================================================================

fn handle_credentials(args: CredentialsArgs) -> anyhow::Result<()> {
    let config: Config = load_config(args.config.as_deref())?;
    let mut store = FileCredentialStore::new(config.credentials.path.clone());

    match args.action {
        CredentialsAction::Show => {
            let credential = store.load()?;
            if credential.is_empty() {
                println!("No credential stored at {}.", store.path().display());
                return Ok(());
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["File", "User", "Password", "Auto login"]);
            table.add_row(vec![
                store.path().display().to_string(),
                credential.user.clone(),
                "*".repeat(credential.password.len()),
                credential.auto_login.to_string(),
            ]);
            println!("{table}");
        }
        CredentialsAction::Reset => {
            store.reset()?;
            println!("Credential removed from {}.", store.path().display());
        }
        CredentialsAction::Set {
            user,
            password,
            auto_login,
        } => {
            let credential = Credential::new(user, password, auto_login);
            if credential.is_empty() {
                anyhow::bail!("user and password must both be non-empty");
            }
            store.save(&credential)?;
            println!("Credential saved to {}.", store.path().display());
        }
    }
    Ok(())
}
