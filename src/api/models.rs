use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::status::AgentState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartEvent {
    pub id: String,
    pub agent_id: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandEvent {
    pub session_id: String,
    pub tool_name: String,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelUsageEvent {
    pub session_id: String,
    pub model: String,
    pub provider: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessPhase {
    Start,
    End,
}

#[derive(Debug, Deserialize)]
pub struct ProcessEvent {
    pub session_id: String,
    pub pid: String,
    pub command: Option<String>,
    pub status: ProcessPhase,
}

#[derive(Debug, Deserialize)]
pub struct ThinkingEvent {
    pub session_id: String,
    pub thought: String,
    pub step: u64,
}

#[derive(Debug, Deserialize)]
pub struct AgentStatusReport {
    pub state: AgentState,
    pub current_action: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStarted {
    pub success: bool,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Recorded {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    /// Requested limit, clamped to [`MAX_LIMIT`]. Zero is rejected by the caller.
    pub fn resolve(&self, default: usize) -> Option<usize> {
        match self.limit {
            Some(0) => None,
            Some(n) => Some(n.min(MAX_LIMIT)),
            None => Some(default),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default = "default_summary_hours")]
    pub hours: u32,
}

fn default_summary_hours() -> u32 {
    24
}

/// Ten years.
pub const MAX_SUMMARY_HOURS: u32 = 87_600;

impl SummaryQuery {
    /// Start of the trailing window ending at `now`, or `None` when `hours` is
    /// outside `1..=MAX_SUMMARY_HOURS`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !(1..=MAX_SUMMARY_HOURS).contains(&self.hours) {
            return None;
        }
        now.checked_sub_signed(Duration::hours(i64::from(self.hours)))
    }
}
