use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Round-trip time in milliseconds, `None` when the probe did not complete.
pub type Latency = Option<f64>;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One probe result as it is written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub host: String,
    #[serde(rename = "ping_ms")]
    pub latency: Latency,
}

impl Sample {
    pub fn new(timestamp: NaiveDateTime, host: impl Into<String>, latency: Latency) -> Self {
        Self {
            timestamp,
            host: host.into(),
            latency,
        }
    }

    /// Local wall-clock time truncated to whole seconds.
    pub fn now_timestamp() -> NaiveDateTime {
        Local::now().naive_local().trunc_subsecs(0)
    }

    pub fn is_success(&self) -> bool {
        self.latency.is_some()
    }

    /// The console line printed for every sample.
    pub fn describe(&self) -> String {
        let when = self.timestamp.format(TIMESTAMP_FORMAT);
        match self.latency {
            Some(ms) => format!("[{when}] {}: {ms} ms", self.host),
            None => format!("[{when}] {}: Timeout", self.host),
        }
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

/// Summary of one host's rolling window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingStatistics {
    pub total_pings: u64,
    pub successful_pings: u64,
    pub failed_pings: u64,
    pub loss_rate: f64,
    pub mean_response_time: f64,
    pub last_response: Latency,
}

impl PingStatistics {
    pub fn from_window(window: &[Latency]) -> Self {
        let total = window.len() as u64;
        let successful = window.iter().filter(|v| v.is_some()).count() as u64;
        let failed = total - successful;
        let total_response_time: f64 = window.iter().flatten().sum();

        let loss_rate = if total > 0 { (failed as f64 / total as f64) * 100.0 } else { 0.0 };
        let mean_response_time = if successful > 0 {
            total_response_time / successful as f64
        } else {
            0.0
        };

        Self {
            total_pings: total,
            successful_pings: successful,
            failed_pings: failed,
            loss_rate,
            mean_response_time,
            last_response: window.last().copied().flatten(),
        }
    }
}
