use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use agentpulse::balance::{spawn_poller, BalanceHistory, BalanceSource, HttpBalanceSource};
use agentpulse::cli::{commands::{Cli, Commands}, run_cli};
use agentpulse::collector::Collector;
use agentpulse::config::{AppConfig, BalanceConfig};
use agentpulse::db;
use agentpulse::fanout::Broadcaster;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

/// Opens the balance history and starts its poller. Tracking is skipped, not fatal, on failure.
fn start_balance_tracking(config: &BalanceConfig) -> Option<Arc<BalanceHistory>> {
    let history = match BalanceHistory::open(&config.history_path) {
        Ok(h) => Arc::new(h),
        Err(e) => {
            warn!("Balance tracking disabled, cannot open {}: {}", config.history_path, e);
            return None;
        }
    };

    let source = match HttpBalanceSource::new(
        config.api_base.clone(),
        config.api_key.clone(),
        Duration::from_secs(config.timeout_secs),
    ) {
        Ok(s) => Arc::new(s) as Arc<dyn BalanceSource>,
        Err(e) => {
            warn!("Balance tracking disabled, cannot build HTTP client: {}", e);
            return None;
        }
    };

    spawn_poller(
        source,
        history.clone(),
        Duration::from_secs(config.poll_interval_secs.max(1)),
    );
    Some(history)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        run_cli(cli.command, cli.config);
        return Ok(());
    }

    info!("Starting AgentPulse telemetry collector...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let broadcaster = Arc::new(Broadcaster::new());
    let collector = web::Data::new(Collector::new(db_pool.clone(), broadcaster));

    let balance_history = match &config.balance {
        Some(balance) => start_balance_tracking(balance),
        None => {
            info!("No balance section configured, balance tracking off");
            None
        }
    };

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(collector.clone())
            .app_data(web::Data::new(db_pool.clone()));
        if let Some(history) = &balance_history {
            app = app.app_data(web::Data::from(history.clone()));
        }
        app.route("/health", web::get().to(health))
            .configure(agentpulse::api::routes::configure)
            .configure(agentpulse::api::websocket::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
