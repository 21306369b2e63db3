use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_engine::{
    config::{Config, LoggingConfig},
    database::{self, PgLedgerRepository},
    handlers::{self, AppState},
    retry::RetryStrategy,
    LedgerRepository, WalletService,
};

#[derive(Parser)]
#[command(name = "wallet-engine", about = "Wallet ledger service", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API (default)
    Serve,
    /// Create or drop the wallet database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[derive(Subcommand)]
enum DbAction {
    /// Create the database and apply the schema
    Init,
    /// Drop the database
    Drop,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.validate().map_err(anyhow::Error::msg)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing(&config.logging);
            serve(config).await
        }
        Command::Db { action } => {
            init_tracing(&config.logging);
            match action {
                DbAction::Init => database::init_database(&config.database).await,
                DbAction::Drop => database::drop_database(&config.database).await,
            }
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        "Starting Wallet Engine on {}:{}",
        config.server.host, config.server.port
    );

    let repository = Arc::new(PgLedgerRepository::new(&config.database).await?);
    repository.health_check().await?;
    info!("Database health check passed");

    let service = Arc::new(WalletService::new(repository));
    let state = web::Data::new(AppState::new(
        service,
        RetryStrategy::new(config.ledger.retry.clone()),
    ));

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(state.clone())
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .shutdown_timeout(config.server.shutdown_timeout_secs)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    info!("Wallet Engine stopped");
    Ok(())
}
