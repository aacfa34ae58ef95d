use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orgauth_api::config::{self, AppConfig};
use orgauth_api::database::{DatabaseManager, MemoryStore, PgStore, Store};
use orgauth_api::mailer::HttpMailer;
use orgauth_api::providers::{self, ProviderRegistry};
use orgauth_api::{app, AppState};

#[derive(Parser)]
#[command(name = "orgauth-api")]
#[command(about = "Multi-tenant authentication API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on, overrides ORGAUTH_PORT")]
        port: Option<u16>,

        #[arg(long, help = "Use the in-memory store even when DATABASE_URL is set")]
        memory: bool,
    },

    #[command(about = "Apply database migrations and exit")]
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("orgauth_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::config().clone();
    config.validate().map_err(anyhow::Error::msg)?;
    tracing::info!("Starting orgauth-api in {:?} mode", config.environment);

    match cli.command.unwrap_or(Command::Serve { port: None, memory: false }) {
        Command::Migrate => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::migrate(&pool).await?;
            Ok(())
        }
        Command::Serve { port, memory } => serve(config, port, memory).await,
    }
}

async fn serve(config: AppConfig, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = if memory || config.database.url.is_none() {
        tracing::warn!("No database configured, using the in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let pool = DatabaseManager::connect(&config.database).await?;
        DatabaseManager::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    let client = providers::http_client()?;
    let mailer = HttpMailer::from_config(client.clone(), &config.mail);
    let registry = ProviderRegistry::with_defaults(client);

    let port = port.unwrap_or(config.server.port);
    let state = AppState::new(config, store, registry, mailer)?;

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("orgauth-api listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
