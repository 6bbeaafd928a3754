use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use expopass::badge::render;
use expopass::store::memory::MemoryStore;
use expopass::store::postgres::PgStore;
use expopass::store::ExpoStore;
use expopass::{api, config, report, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "expopass=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port, memory }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, memory).await
        }
        Some(cli::Commands::Qr { command }) => {
            let store = open_store(&cfg, false).await?;
            let state = AppState::new(store.clone(), cfg);
            let result = handle_qr_command(command, &state).await;
            store.close().await;
            result
        }
        Some(cli::Commands::Report { command }) => {
            let store = open_store(&cfg, false).await?;
            let result = handle_report_command(command, store.as_ref()).await;
            store.close().await;
            result
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port, false).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn open_store(cfg: &config::Config, memory: bool) -> anyhow::Result<Arc<dyn ExpoStore>> {
    if memory {
        tracing::warn!("using the in-memory store; nothing survives a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    Ok(Arc::new(db))
}

async fn run_server(cfg: config::Config, port: u16, memory: bool) -> anyhow::Result<()> {
    let store = open_store(&cfg, memory).await?;
    let state = Arc::new(AppState::new(store.clone(), cfg));

    let app = api::app(state).layer(DefaultBodyLimit::max(1024 * 1024));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ExpoPass listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped, closing store");
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_qr_command(cmd: cli::QrCommands, state: &AppState) -> anyhow::Result<()> {
    match cmd {
        cli::QrCommands::Issue { role, id } => {
            let id = Uuid::parse_str(&id).context("Invalid id")?;
            let token = state.issuer.issue(role, id).await?;
            println!("Token issued for {} {}:\n  {}", role, id, token.value);
            if let Some(exp) = token.expires_at {
                println!("  expires {}", exp.to_rfc3339());
            }
        }
        cli::QrCommands::Verify { token } => {
            let payload = state.verifier.verify(&token).await?.into_payload();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        cli::QrCommands::Render { token, size, out } => {
            let size = render::clamp_size(size, state.config.qr_default_size);
            let png = render::render_png(&token, size)?;
            std::fs::write(&out, &png).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({}px, {} bytes)", out.display(), size, png.len());
        }
        cli::QrCommands::Export {
            event_id,
            role,
            out,
        } => {
            let event_id = Uuid::parse_str(&event_id).context("Invalid event_id")?;
            let zip = api::qrcode::build_archive(state, role, event_id).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}-{}s.zip", event_id, role)));
            std::fs::write(&out, &zip).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), zip.len());
        }
    }
    Ok(())
}

async fn handle_report_command(
    cmd: cli::ReportCommands,
    store: &dyn ExpoStore,
) -> anyhow::Result<()> {
    match cmd {
        cli::ReportCommands::Summary { event_id } => {
            let event_id = Uuid::parse_str(&event_id).context("Invalid event_id")?;
            let summary = report::event_summary(store, event_id).await?;
            println!("{}", summary.event_name);
            println!("  attendees        {:>8}", summary.counts.total_attendees);
            println!("  booths           {:>8}", summary.counts.total_booths);
            println!("  scans            {:>8}", summary.counts.total_scans);
            println!("  unique visitors  {:>8}", summary.counts.unique_visitors);
            println!("  active booths    {:>8}", summary.counts.active_booths);
            println!("  engagement rate  {:>8.2}", summary.engagement_rate);
        }
    }
    Ok(())
}
