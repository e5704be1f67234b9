//! Capacity-bounded balance time series, persisted as a JSON array beside
//! (not inside) the relational store.

use super::BalanceError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

pub const MAX_SAMPLES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSample {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalTracked {
    pub spent: f64,
    pub hours: f64,
    pub hourly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSpend {
    pub spent: f64,
    /// Timestamp of the sample the figure is measured from.
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpendPeriods {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hour: Option<PeriodSpend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_24h: Option<PeriodSpend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendStats {
    pub current_balance: f64,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tracked: Option<TotalTracked>,
    pub periods: SpendPeriods,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Spend measured from the newest sample at or before `now - window`.
/// `None` when no sample is that old; nothing is interpolated.
fn spend_since(
    history: &[BalanceSample],
    current_balance: f64,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<PeriodSpend> {
    let cutoff = now - window;
    history
        .iter()
        .rev()
        .find(|s| s.timestamp <= cutoff)
        .map(|s| PeriodSpend {
            spent: s.balance - current_balance,
            since: s.timestamp,
        })
}

/// Derives spend figures from `history` (oldest first).
pub fn spend_stats(history: &[BalanceSample], current_balance: f64, now: DateTime<Utc>) -> SpendStats {
    let total_tracked = match history.first() {
        Some(first) if history.len() >= 2 => {
            let spent = first.balance - current_balance;
            let hours = (now - first.timestamp).num_milliseconds() as f64 / 3_600_000.0;
            let hourly_rate = if hours > 0.0 { round2(spent / hours) } else { 0.0 };
            Some(TotalTracked { spent, hours, hourly_rate })
        }
        _ => None,
    };

    SpendStats {
        current_balance,
        samples: history.len(),
        total_tracked,
        periods: SpendPeriods {
            last_hour: spend_since(history, current_balance, now, Duration::hours(1)),
            last_24h: spend_since(history, current_balance, now, Duration::hours(24)),
        },
    }
}

pub struct BalanceHistory {
    path: PathBuf,
    samples: Mutex<Vec<BalanceSample>>,
}

impl BalanceHistory {
    /// Loads the persisted sequence, or starts empty when there is none yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BalanceError> {
        let path = path.into();
        let samples = match fs::read_to_string(&path) {
            Ok(raw) => {
                let mut samples: Vec<BalanceSample> = serde_json::from_str(&raw)?;
                truncate_oldest(&mut samples);
                samples
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), samples = samples.len(), "loaded balance history");

        Ok(Self {
            path,
            samples: Mutex::new(samples),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a reading, evicts the oldest past [`MAX_SAMPLES`] and rewrites
    /// the file. The lock is held across the write so appends cannot interleave,
    /// and memory only changes once the file has been replaced.
    pub fn record(&self, balance: f64, now: DateTime<Utc>) -> Result<BalanceSample, BalanceError> {
        let sample = BalanceSample { timestamp: now, balance };
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = samples.clone();
        next.push(sample.clone());
        truncate_oldest(&mut next);

        if let Err(e) = persist(&self.path, &next) {
            warn!(path = %self.path.display(), error = %e, "failed to persist balance history");
            return Err(e);
        }
        *samples = next;
        Ok(sample)
    }

    pub fn samples(&self) -> Vec<BalanceSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Option<BalanceSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Stats against the newest sample, computed fresh on every call.
    pub fn stats(&self, now: DateTime<Utc>) -> Option<SpendStats> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let current = samples.last()?.balance;
        Some(spend_stats(&samples, current, now))
    }
}

fn truncate_oldest(samples: &mut Vec<BalanceSample>) {
    if samples.len() > MAX_SAMPLES {
        let excess = samples.len() - MAX_SAMPLES;
        samples.drain(..excess);
    }
}

// Write-then-rename so a crash never leaves a half-written file behind.
fn persist(path: &Path, samples: &[BalanceSample]) -> Result<(), BalanceError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_vec(samples)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
