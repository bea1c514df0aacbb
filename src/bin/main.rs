//! Broker Health Agent entry point

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use broker_health::client::AlertsClient;
use broker_health::contracts::HealthStatus;
use broker_health::handler::{create_router, AppState};
use broker_health::{Config, HealthEngine};

#[derive(Parser)]
#[command(name = "broker-health")]
#[command(about = "Broker Health Agent - bound evaluation and health aggregation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation loop and serve health reports
    Run {
        /// Path to the TOML config file
        #[arg(short, long, env = "BROKER_HEALTH_CONFIG")]
        config: String,

        /// Address to serve reports on
        #[arg(long, default_value = "0.0.0.0:8082")]
        listen: String,
    },

    /// Run a single evaluation tick and print the report
    Check {
        /// Path to the TOML config file
        #[arg(short, long, env = "BROKER_HEALTH_CONFIG")]
        config: String,
    },

    /// Query the alert backend once and print the firing alerts
    Alerts {
        /// Path to the TOML config file
        #[arg(short, long, env = "BROKER_HEALTH_CONFIG")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, listen } => {
            let config = Config::load(&config)?;
            let engine = HealthEngine::from_config(&config)?;

            let (tx, rx) = watch::channel(None);
            let state = Arc::new(AppState::new(rx));
            let router = create_router(state);

            let addr: SocketAddr = listen.parse()?;
            tracing::info!(
                %addr,
                elements = config.elements.len(),
                alerts = config.prometheus.alerts.len(),
                "starting Broker Health Agent"
            );

            tokio::spawn(engine.run(tx));

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Check { config } => {
            let config = Config::load(&config)?;
            let mut engine = HealthEngine::from_config(&config)?;

            let report = engine.run_tick().await;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.global == HealthStatus::Degraded {
                std::process::exit(1);
            }
        }

        Commands::Alerts { config } => {
            let config = Config::load(&config)?;
            let client = AlertsClient::new(
                &config.prometheus.url,
                config
                    .agent
                    .fetch_timeout()
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(30)),
            )?;

            let alerts = client.active_alerts().await?;
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
    }

    Ok(())
}
