pub mod commands;

use chrono::{Duration, Utc};

use duckdb::Connection;
use thiserror::Error;

use crate::api::models::{SummaryQuery, MAX_SUMMARY_HOURS};
use crate::cli::commands::{Commands, SessionAction};
use crate::config::AppConfig;
use crate::cost;
use crate::db::{get_connection, DbService, StoreError};

pub fn run_cli(command: Commands, config_path: String) {
    let config = match AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(command, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_rates() {
    println!("{:<28} | {:>12} | {:>12}", "Model", "In / 1K", "Out / 1K");
    println!("{:-<28}-+-{:->12}-+-{:->12}", "", "", "");
    for (model, rate) in cost::rate_table() {
        println!("{:<28} | {:>12.6} | {:>12.6}", model, rate.input_per_1k, rate.output_per_1k);
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Db(#[from] duckdb::Error),
    #[error("{0}")]
    Usage(String),
}

fn with_store<T>(
    config: &AppConfig,
    f: impl FnOnce(&Connection) -> Result<T, CliError>,
) -> Result<T, CliError> {
    let pool = get_connection(&config.database)?;
    let conn = DbService::lock(&pool)?;
    f(&conn)
}

fn run_command(command: Commands, config: &AppConfig) -> Result<(), CliError> {
    match command {
        Commands::Serve => Err(CliError::Usage(
            "`serve` starts the server and is not handled here".into(),
        )),
        Commands::Rates => {
            print_rates();
            Ok(())
        }
        Commands::Summary { hours } => {
            let since = SummaryQuery { hours }.window_start(Utc::now()).ok_or_else(|| {
                CliError::Usage(format!("--hours must be between 1 and {MAX_SUMMARY_HOURS}"))
            })?;
            let summary = with_store(config, |conn| Ok(DbService::summary(conn, since)?))?;
            println!("Window:          last {}h", hours);
            println!("Sessions:        {}", summary.total_sessions);
            println!("Active sessions: {}", summary.active_sessions);
            println!("Commands:        {}", summary.total_commands);
            println!("Input tokens:    {}", summary.total_input_tokens);
            println!("Output tokens:   {}", summary.total_output_tokens);
            println!("Cost (USD):      {:.4}", summary.total_cost);
            Ok(())
        }
        Commands::Costs => {
            let since = Utc::now() - Duration::days(7);
            let costs = with_store(config, |conn| Ok(DbService::cost_breakdown(conn, since)?))?;
            if costs.is_empty() {
                println!("No model usage in the last 7 days.");
                return Ok(());
            }
            println!(
                "{:<10} | {:<24} | {:>8} | {:>10} | {:>10} | {:>10}",
                "Date", "Model", "Requests", "Input", "Output", "Cost"
            );
            println!("{:-<10}-+-{:-<24}-+-{:->8}-+-{:->10}-+-{:->10}-+-{:->10}", "", "", "", "", "", "");
            for row in costs {
                println!(
                    "{:<10} | {:<24} | {:>8} | {:>10} | {:>10} | {:>10.4}",
                    row.date, row.model, row.requests, row.input_tokens, row.output_tokens, row.cost
                );
            }
            Ok(())
        }
        Commands::Session { action } => match action {
            SessionAction::End { id } => {
                let updated = with_store(config, |conn| Ok(DbService::end_session(conn, &id, Utc::now())?))?;
                match updated {
                    0 => println!("Session {} not found.", id),
                    _ => println!("Session {} marked completed.", id),
                }
                Ok(())
            }
        },
        Commands::Reset { yes } => {
            if !yes {
                println!("Refusing to reset without --yes.");
                return Ok(());
            }
            with_store(config, |conn| Ok(DbService::reset(conn)?))?;
            println!("All telemetry deleted.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ServerConfig};

    fn config(path: &str) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                path: path.to_string(),
            },
            balance: None,
        }
    }

    #[test]
    fn oversized_summary_window_is_a_usage_error() {
        let result = run_command(Commands::Summary { hours: u32::MAX }, &config(":memory:"));
        assert!(matches!(result, Err(CliError::Usage(_))));
    }

    #[test]
    fn serve_is_rejected_without_panicking() {
        let result = run_command(Commands::Serve, &config(":memory:"));
        assert!(matches!(result, Err(CliError::Usage(_))));
    }

    #[test]
    fn store_commands_run_against_an_empty_store() {
        let cfg = config(":memory:");
        run_command(Commands::Summary { hours: 24 }, &cfg).unwrap();
        run_command(Commands::Costs, &cfg).unwrap();
        run_command(Commands::Reset { yes: true }, &cfg).unwrap();
    }
}
