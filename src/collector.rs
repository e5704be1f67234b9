//! Event ingress: validate, persist, then fan out.
//!
//! Every write releases the store lock before broadcasting, and a broadcast
//! failure is never reported back to the caller.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::error::ApiError;
use crate::api::models::{
    AgentStatusReport, CommandEvent, ModelUsageEvent, ProcessEvent, ProcessPhase,
    SessionStartEvent, ThinkingEvent,
};
use crate::db::{Command, DbPool, DbService, ModelUsage, Process, StoreError};
use crate::fanout::{Broadcaster, Envelope, EnvelopeType};
use crate::status::{AgentStatus, StatusTracker};

/// Result of a process event. `id` is `None` for an end event with an unknown pid.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub phase: ProcessPhase,
    pub id: Option<i64>,
}

pub struct Collector {
    pool: DbPool,
    status: StatusTracker,
    broadcaster: Arc<Broadcaster>,
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

fn to_i64(field: &str, value: u64) -> Result<i64, ApiError> {
    i64::try_from(value).map_err(|_| ApiError::Validation(format!("`{field}` is out of range")))
}

fn persist_failed(op: &str, e: StoreError) -> ApiError {
    error!("Failed to {}: {}", op, e);
    ApiError::Persistence(e)
}

impl Collector {
    pub fn new(pool: DbPool, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            pool,
            status: StatusTracker::default(),
            broadcaster,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    fn publish<T: Serialize>(&self, r#type: EnvelopeType, data: &T) {
        self.broadcaster.broadcast(&Envelope::new(r#type, data));
    }

    /// No upsert: a duplicate id surfaces as a persistence error.
    pub fn start_session(&self, event: SessionStartEvent) -> Result<String, ApiError> {
        require("id", &event.id)?;
        require("agent_id", &event.agent_id)?;
        require("model", &event.model)?;

        {
            let conn = DbService::lock(&self.pool)?;
            DbService::insert_session(&conn, &event.id, &event.agent_id, &event.model, Utc::now())
                .map_err(|e| persist_failed("insert session", e))?;
        }
        debug!(session_id = %event.id, agent_id = %event.agent_id, "session started");

        self.publish(EnvelopeType::SessionStart, &event);
        Ok(event.id)
    }

    pub fn record_command(&self, event: CommandEvent) -> Result<Command, ApiError> {
        require("session_id", &event.session_id)?;
        require("tool_name", &event.tool_name)?;
        let duration_ms = to_i64("duration_ms", event.duration_ms)?;

        let command = {
            let conn = DbService::lock(&self.pool)?;
            DbService::insert_command(
                &conn,
                &event.session_id,
                &event.tool_name,
                duration_ms,
                event.success,
                event.error.as_deref(),
                Utc::now(),
            )
            .map_err(|e| persist_failed("insert command", e))?
        };
        debug!(session_id = %command.session_id, tool = %command.tool_name, "command recorded");

        self.publish(
            EnvelopeType::Command,
            &json!({
                "session_id": command.session_id,
                "tool_name": command.tool_name,
                "duration_ms": command.duration_ms,
                "success": command.success,
                "timestamp": command.timestamp,
            }),
        );
        Ok(command)
    }

    pub fn record_model_usage(&self, event: ModelUsageEvent) -> Result<ModelUsage, ApiError> {
        require("session_id", &event.session_id)?;
        require("model", &event.model)?;
        require("provider", &event.provider)?;
        let input_tokens = to_i64("input_tokens", event.input_tokens)?;
        let output_tokens = to_i64("output_tokens", event.output_tokens)?;
        let thinking_time_ms = event
            .thinking_time_ms
            .map(|ms| to_i64("thinking_time_ms", ms))
            .transpose()?;
        if input_tokens.checked_add(output_tokens).is_none() {
            return Err(ApiError::Validation("token counts are out of range".into()));
        }

        let usage = {
            let conn = DbService::lock(&self.pool)?;
            DbService::insert_model_usage(
                &conn,
                &event.session_id,
                &event.model,
                &event.provider,
                input_tokens,
                output_tokens,
                thinking_time_ms,
                Utc::now(),
            )
            .map_err(|e| persist_failed("insert model usage", e))?
        };
        debug!(
            session_id = %usage.session_id,
            model = %usage.model,
            total_tokens = usage.total_tokens,
            cost_usd = usage.cost_usd,
            "model usage recorded"
        );

        self.publish(EnvelopeType::Llm, &usage);
        Ok(usage)
    }

    pub fn record_process(&self, event: ProcessEvent) -> Result<ProcessOutcome, ApiError> {
        require("session_id", &event.session_id)?;
        require("pid", &event.pid)?;
        let now = Utc::now();

        match event.status {
            ProcessPhase::Start => {
                let process: Process = {
                    let conn = DbService::lock(&self.pool)?;
                    DbService::start_process(
                        &conn,
                        &event.session_id,
                        &event.pid,
                        event.command.as_deref(),
                        now,
                    )
                    .map_err(|e| persist_failed("insert process", e))?
                };
                debug!(pid = %process.pid, id = process.id, "process started");

                self.publish(EnvelopeType::ProcessStart, &process);
                Ok(ProcessOutcome {
                    phase: ProcessPhase::Start,
                    id: Some(process.id),
                })
            }
            ProcessPhase::End => {
                let id = {
                    let conn = DbService::lock(&self.pool)?;
                    DbService::end_process(&conn, &event.pid, now)
                        .map_err(|e| persist_failed("close process", e))?
                };
                debug!(pid = %event.pid, matched = id.is_some(), "process ended");

                self.publish(
                    EnvelopeType::ProcessEnd,
                    &json!({
                        "id": id,
                        "session_id": event.session_id,
                        "pid": event.pid,
                        "timestamp": now,
                    }),
                );
                Ok(ProcessOutcome {
                    phase: ProcessPhase::End,
                    id,
                })
            }
        }
    }

    pub fn record_thinking(&self, event: ThinkingEvent) -> Result<i64, ApiError> {
        require("session_id", &event.session_id)?;
        require("thought", &event.thought)?;

        let record = {
            let conn = DbService::lock(&self.pool)?;
            DbService::insert_event(
                &conn,
                &event.session_id,
                "thinking",
                json!({ "thought": event.thought, "step": event.step }),
                Utc::now(),
            )
            .map_err(|e| persist_failed("insert thinking event", e))?
        };

        self.publish(
            EnvelopeType::Thinking,
            &json!({
                "session_id": event.session_id,
                "thought": event.thought,
                "step": event.step,
                "timestamp": record.timestamp,
            }),
        );
        Ok(record.id)
    }

    pub fn report_status(&self, report: AgentStatusReport) -> AgentStatus {
        let status = self.status.report(
            report.state,
            report.current_action,
            report.session_id,
            Utc::now(),
        );
        debug!(state = ?status.state, "agent status reported");

        self.publish(EnvelopeType::Status, &status);
        status
    }
}
