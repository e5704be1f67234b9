use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_commands_id;
CREATE SEQUENCE IF NOT EXISTS seq_model_usage_id;
CREATE SEQUENCE IF NOT EXISTS seq_processes_id;
CREATE SEQUENCE IF NOT EXISTS seq_events_id;

CREATE TABLE IF NOT EXISTS sessions (
    id VARCHAR PRIMARY KEY,
    started_at TIMESTAMP NOT NULL,
    ended_at TIMESTAMP,
    agent_id VARCHAR NOT NULL,
    model VARCHAR NOT NULL,
    status VARCHAR NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS commands (
    id BIGINT PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    tool_name VARCHAR NOT NULL,
    recorded_at TIMESTAMP NOT NULL,
    duration_ms BIGINT NOT NULL,
    success BOOLEAN NOT NULL,
    error_text TEXT
);

CREATE TABLE IF NOT EXISTS model_usage (
    id BIGINT PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    model VARCHAR NOT NULL,
    provider VARCHAR NOT NULL,
    recorded_at TIMESTAMP NOT NULL,
    input_tokens BIGINT NOT NULL,
    output_tokens BIGINT NOT NULL,
    total_tokens BIGINT NOT NULL,
    cost_usd DOUBLE NOT NULL,
    thinking_time_ms BIGINT
);

CREATE TABLE IF NOT EXISTS processes (
    id BIGINT PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    pid VARCHAR NOT NULL,
    command TEXT,
    started_at TIMESTAMP NOT NULL,
    ended_at TIMESTAMP,
    status VARCHAR NOT NULL DEFAULT 'running'
);

CREATE TABLE IF NOT EXISTS events (
    id BIGINT PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    event_type VARCHAR NOT NULL,
    recorded_at TIMESTAMP NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commands_session ON commands(session_id);
CREATE INDEX IF NOT EXISTS idx_model_usage_session ON model_usage(session_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, recorded_at);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Connecting to DuckDB at {}", config.path);
    let conn = Connection::open(&config.path)?;

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
