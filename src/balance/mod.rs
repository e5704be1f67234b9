pub mod history;
pub mod poller;
pub mod source;

pub use history::{spend_stats, BalanceHistory, BalanceSample, SpendStats, MAX_SAMPLES};
pub use poller::{poll_once, spawn_poller};
pub use source::{BalanceSource, HttpBalanceSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("balance request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("balance API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed balance payload: {0}")]
    Payload(String),
    #[error("balance history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("balance history encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}
