//! Process-wide agent status, overwritten by every report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Thinking,
    Busy,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub state: AgentState,
    pub current_action: Option<String>,
    /// Set on every transition into `busy`; never cleared.
    pub action_start_time: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Status snapshot as returned by the status query.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub status: AgentStatus,
    pub elapsed_ms: Option<i64>,
}

impl AgentStatus {
    pub fn view(&self, now: DateTime<Utc>) -> StatusView {
        let elapsed_ms = match (self.state, self.action_start_time) {
            (AgentState::Busy, Some(start)) => Some((now - start).num_milliseconds()),
            _ => None,
        };
        StatusView {
            status: self.clone(),
            elapsed_ms,
        }
    }
}

pub struct StatusTracker {
    current: Mutex<AgentStatus>,
}

impl StatusTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(AgentStatus {
                state: AgentState::Idle,
                current_action: None,
                action_start_time: None,
                session_id: None,
                last_activity: now,
            }),
        }
    }

    /// Applies a report and returns the resulting snapshot. Omitted fields keep
    /// their previous value; any state may follow any other.
    pub fn report(
        &self,
        state: AgentState,
        current_action: Option<String>,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> AgentStatus {
        // The record is replaced field by field, so a poisoned guard is still usable.
        let mut status = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        status.state = state;
        if current_action.is_some() {
            status.current_action = current_action;
        }
        if session_id.is_some() {
            status.session_id = session_id;
        }
        if state == AgentState::Busy {
            status.action_start_time = Some(now);
        }
        status.last_activity = now;

        status.clone()
    }

    pub fn snapshot(&self) -> AgentStatus {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
