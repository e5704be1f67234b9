use crate::cost;
use crate::db::connection::DbPool;
use crate::db::models::{
    Activity, ActivityKind, Command, DailyCost, EventRecord, ModelUsage, Process, ProcessStatus,
    Session, SessionStatus, Summary,
};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use duckdb::{params, types::Type, Connection, Result as DbResult, Row};
use std::sync::MutexGuard;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("malformed stored payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn to_db_ts(at: &DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

fn conversion_error(idx: usize, msg: String) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

// Timestamps come back as `CAST(... AS VARCHAR)`, e.g. "2026-01-02 03:04:05.123456".
fn parse_ts(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, format!("bad timestamp {raw:?}: {e}")))
}

fn parse_opt_ts(row: &Row, idx: usize) -> DbResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(_) => parse_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn next_id(conn: &Connection, sequence: &str) -> DbResult<i64> {
    conn.query_row(&format!("SELECT nextval('{sequence}')"), [], |row| row.get(0))
}

pub struct DbService;

impl DbService {
    pub fn lock(pool: &DbPool) -> StoreResult<MutexGuard<'_, Connection>> {
        pool.lock().map_err(|_| StoreError::Poisoned)
    }

    fn row_to_session(row: &Row) -> DbResult<Session> {
        let status: String = row.get(5)?;
        Ok(Session {
            id: row.get(0)?,
            started_at: parse_ts(row, 1)?,
            ended_at: parse_opt_ts(row, 2)?,
            agent_id: row.get(3)?,
            model: row.get(4)?,
            status: SessionStatus::parse(&status)
                .ok_or_else(|| conversion_error(5, format!("unknown session status {status:?}")))?,
        })
    }

    fn row_to_process(row: &Row) -> DbResult<Process> {
        let status: String = row.get(6)?;
        Ok(Process {
            id: row.get(0)?,
            session_id: row.get(1)?,
            pid: row.get(2)?,
            command: row.get(3)?,
            started_at: parse_ts(row, 4)?,
            ended_at: parse_opt_ts(row, 5)?,
            status: ProcessStatus::parse(&status)
                .ok_or_else(|| conversion_error(6, format!("unknown process status {status:?}")))?,
        })
    }

    fn row_to_usage(row: &Row) -> DbResult<ModelUsage> {
        Ok(ModelUsage {
            id: row.get(0)?,
            session_id: row.get(1)?,
            model: row.get(2)?,
            provider: row.get(3)?,
            timestamp: parse_ts(row, 4)?,
            input_tokens: row.get(5)?,
            output_tokens: row.get(6)?,
            total_tokens: row.get(7)?,
            cost_usd: row.get(8)?,
            thinking_time_ms: row.get(9)?,
        })
    }

    // --- Sessions ---

    /// Fails with a constraint error when `id` already exists.
    pub fn insert_session(
        conn: &Connection,
        id: &str,
        agent_id: &str,
        model: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let at = at.trunc_subsecs(6);
        conn.execute(
            "INSERT INTO sessions (id, started_at, agent_id, model, status)
             VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?)",
            params![id, to_db_ts(&at), agent_id, model, SessionStatus::Active.as_str()],
        )?;

        Ok(Session {
            id: id.to_string(),
            started_at: at,
            ended_at: None,
            agent_id: agent_id.to_string(),
            model: model.to_string(),
            status: SessionStatus::Active,
        })
    }

    pub fn get_session(conn: &Connection, id: &str) -> StoreResult<Option<Session>> {
        let mut stmt = conn.prepare(
            "SELECT id, CAST(started_at AS VARCHAR), CAST(ended_at AS VARCHAR), agent_id, model, status
             FROM sessions WHERE id = ?",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_session)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Marks a session completed. Returns the number of rows touched (0 or 1).
    pub fn end_session(conn: &Connection, id: &str, at: DateTime<Utc>) -> StoreResult<usize> {
        let updated = conn.execute(
            "UPDATE sessions SET status = ?, ended_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            params![SessionStatus::Completed.as_str(), to_db_ts(&at), id],
        )?;
        Ok(updated)
    }

    // --- Commands ---

    pub fn insert_command(
        conn: &Connection,
        session_id: &str,
        tool_name: &str,
        duration_ms: i64,
        success: bool,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Command> {
        let at = at.trunc_subsecs(6);
        let id = next_id(conn, "seq_commands_id")?;
        conn.execute(
            "INSERT INTO commands (id, session_id, tool_name, recorded_at, duration_ms, success, error_text)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, ?)",
            params![id, session_id, tool_name, to_db_ts(&at), duration_ms, success, error],
        )?;

        Ok(Command {
            id,
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            timestamp: at,
            duration_ms,
            success,
            error: error.map(str::to_string),
        })
    }

    // --- Model usage ---

    /// Derives `total_tokens` and `cost_usd` once, here; they are never recomputed.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_model_usage(
        conn: &Connection,
        session_id: &str,
        model: &str,
        provider: &str,
        input_tokens: i64,
        output_tokens: i64,
        thinking_time_ms: Option<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<ModelUsage> {
        let at = at.trunc_subsecs(6);
        let total_tokens = input_tokens + output_tokens;
        let cost_usd = cost::cost(model, input_tokens as u64, output_tokens as u64);
        let id = next_id(conn, "seq_model_usage_id")?;

        conn.execute(
            "INSERT INTO model_usage (id, session_id, model, provider, recorded_at, input_tokens,
                                      output_tokens, total_tokens, cost_usd, thinking_time_ms)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?)",
            params![
                id,
                session_id,
                model,
                provider,
                to_db_ts(&at),
                input_tokens,
                output_tokens,
                total_tokens,
                cost_usd,
                thinking_time_ms
            ],
        )?;

        Ok(ModelUsage {
            id,
            session_id: session_id.to_string(),
            model: model.to_string(),
            provider: provider.to_string(),
            timestamp: at,
            input_tokens,
            output_tokens,
            total_tokens,
            cost_usd,
            thinking_time_ms,
        })
    }

    pub fn get_model_usage(conn: &Connection, session_id: &str) -> StoreResult<Vec<ModelUsage>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, model, provider, CAST(recorded_at AS VARCHAR), input_tokens,
                    output_tokens, total_tokens, cost_usd, thinking_time_ms
             FROM model_usage WHERE session_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], Self::row_to_usage)?;

        let mut usage = Vec::new();
        for row in rows {
            usage.push(row?);
        }
        Ok(usage)
    }

    // --- Processes ---

    pub fn start_process(
        conn: &Connection,
        session_id: &str,
        pid: &str,
        command: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Process> {
        let at = at.trunc_subsecs(6);
        let id = next_id(conn, "seq_processes_id")?;
        conn.execute(
            "INSERT INTO processes (id, session_id, pid, command, started_at, status)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?)",
            params![id, session_id, pid, command, to_db_ts(&at), ProcessStatus::Running.as_str()],
        )?;

        Ok(Process {
            id,
            session_id: session_id.to_string(),
            pid: pid.to_string(),
            command: command.map(str::to_string),
            started_at: at,
            ended_at: None,
            status: ProcessStatus::Running,
        })
    }

    /// Closes the most recent process row with this pid, regardless of session.
    /// An unknown pid is not an error: `Ok(None)` and nothing is touched.
    pub fn end_process(conn: &Connection, pid: &str, at: DateTime<Utc>) -> StoreResult<Option<i64>> {
        let target = {
            let mut stmt =
                conn.prepare("SELECT id FROM processes WHERE pid = ? ORDER BY id DESC LIMIT 1")?;
            let mut rows = stmt.query_map(params![pid], |row| row.get::<_, i64>(0))?;
            match rows.next() {
                Some(id) => id?,
                None => return Ok(None),
            }
        };

        conn.execute(
            "UPDATE processes SET status = ?, ended_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            params![ProcessStatus::Completed.as_str(), to_db_ts(&at), target],
        )?;
        Ok(Some(target))
    }

    pub fn get_process(conn: &Connection, id: i64) -> StoreResult<Option<Process>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, pid, command, CAST(started_at AS VARCHAR),
                    CAST(ended_at AS VARCHAR), status
             FROM processes WHERE id = ?",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_process)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // --- Event log ---

    pub fn insert_event(
        conn: &Connection,
        session_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<EventRecord> {
        let at = at.trunc_subsecs(6);
        let id = next_id(conn, "seq_events_id")?;
        conn.execute(
            "INSERT INTO events (id, session_id, event_type, recorded_at, payload)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), ?)",
            params![id, session_id, event_type, to_db_ts(&at), payload.to_string()],
        )?;

        Ok(EventRecord {
            id,
            session_id: session_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: at,
            payload,
        })
    }

    /// Most recent "thinking" events, newest first.
    pub fn reasoning_log(conn: &Connection, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, event_type, CAST(recorded_at AS VARCHAR), payload
             FROM events WHERE event_type = 'thinking'
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                parse_ts(row, 3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, event_type, timestamp, payload) = row?;
            events.push(EventRecord {
                id,
                session_id,
                event_type,
                timestamp,
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(events)
    }

    // --- Dashboard queries ---

    /// Aggregates over sessions started at or after `since`. `active_sessions` ignores the
    /// window, and commands/usage count only when their session started inside it.
    pub fn summary(conn: &Connection, since: DateTime<Utc>) -> StoreResult<Summary> {
        let since = to_db_ts(&since);

        let (total_sessions, active_sessions, total_commands) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM sessions WHERE started_at >= CAST(? AS TIMESTAMP)),
                (SELECT COUNT(*) FROM sessions WHERE status = 'active'),
                (SELECT COUNT(*) FROM commands c JOIN sessions s ON c.session_id = s.id
                    WHERE s.started_at >= CAST(? AS TIMESTAMP))",
            params![since, since],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )?;

        let (total_input_tokens, total_output_tokens, total_cost) = conn.query_row(
            "SELECT CAST(COALESCE(SUM(u.input_tokens), 0) AS BIGINT),
                    CAST(COALESCE(SUM(u.output_tokens), 0) AS BIGINT),
                    CAST(COALESCE(SUM(u.cost_usd), 0) AS DOUBLE)
             FROM model_usage u JOIN sessions s ON u.session_id = s.id
             WHERE s.started_at >= CAST(? AS TIMESTAMP)",
            params![since],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, f64>(2)?)),
        )?;

        Ok(Summary {
            total_sessions,
            active_sessions,
            total_commands,
            total_input_tokens,
            total_output_tokens,
            total_cost,
        })
    }

    /// Commands and model calls interleaved, newest first.
    pub fn recent_activity(conn: &Connection, limit: usize) -> StoreResult<Vec<Activity>> {
        let mut stmt = conn.prepare(
            "SELECT kind, name, CAST(occurred_at AS VARCHAR), session_id, amount, success FROM (
                SELECT 'command' AS kind, tool_name AS name, recorded_at AS occurred_at, session_id,
                       duration_ms AS amount, success
                FROM commands
                UNION ALL
                SELECT 'llm' AS kind, model AS name, recorded_at AS occurred_at, session_id,
                       total_tokens AS amount, CAST(NULL AS BOOLEAN) AS success
                FROM model_usage
             ) activity
             ORDER BY occurred_at DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let kind: String = row.get(0)?;
            Ok(Activity {
                kind: if kind == "llm" { ActivityKind::Llm } else { ActivityKind::Command },
                name: row.get(1)?,
                timestamp: parse_ts(row, 2)?,
                session_id: row.get(3)?,
                duration_or_tokens: row.get(4)?,
                success: row.get(5)?,
            })
        })?;

        let mut activity = Vec::new();
        for row in rows {
            activity.push(row?);
        }
        Ok(activity)
    }

    /// Usage grouped by calendar day (UTC) and model, newest day first.
    pub fn cost_breakdown(conn: &Connection, since: DateTime<Utc>) -> StoreResult<Vec<DailyCost>> {
        let mut stmt = conn.prepare(
            "SELECT CAST(CAST(recorded_at AS DATE) AS VARCHAR) AS usage_date, model, COUNT(*),
                    CAST(SUM(input_tokens) AS BIGINT), CAST(SUM(output_tokens) AS BIGINT),
                    CAST(SUM(cost_usd) AS DOUBLE)
             FROM model_usage
             WHERE recorded_at >= CAST(? AS TIMESTAMP)
             GROUP BY usage_date, model
             ORDER BY usage_date DESC, model ASC",
        )?;
        let rows = stmt.query_map(params![to_db_ts(&since)], |row| {
            Ok(DailyCost {
                date: row.get(0)?,
                model: row.get(1)?,
                requests: row.get(2)?,
                input_tokens: row.get(3)?,
                output_tokens: row.get(4)?,
                cost: row.get(5)?,
            })
        })?;

        let mut costs = Vec::new();
        for row in rows {
            costs.push(row?);
        }
        Ok(costs)
    }

    /// Deletes every row from every table. Sequences keep counting.
    pub fn reset(conn: &Connection) -> StoreResult<()> {
        conn.execute("BEGIN TRANSACTION", [])?;

        for table in ["events", "processes", "model_usage", "commands", "sessions"] {
            if let Err(e) = conn.execute(&format!("DELETE FROM {table}"), []) {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e.into());
            }
        }

        conn.execute("COMMIT", [])?;
        Ok(())
    }
}
