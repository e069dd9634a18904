use std::fmt;

use crate::error::RelayError;

/// identity of an in-flight transfer: the normalized target url
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey(String);

impl TransferKey {
    /// parse and normalize a raw target url, only absolute http(s) urls are accepted
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::InvalidUrl("'url' parameter is missing".to_string()));
        }

        let url = reqwest::Url::parse(raw)
            .map_err(|e| RelayError::InvalidUrl(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(Self(url.to_string())),
            other => Err(RelayError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, raw
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Streaming,
    Finished,
    Error,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Streaming => "streaming",
            TransferStatus::Finished => "finished",
            TransferStatus::Error => "error",
        }
    }
}

/// one point in a transfer's progress
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    pub status: TransferStatus,
    pub bytes_downloaded: u64,
    /// declared upstream content length, `None` when not declared
    pub total_bytes: Option<u64>,
    /// bits per second since the relay was first invoked
    pub speed_bps: f64,
    /// percent of `total_bytes`, `None` when the size is unknown
    pub progress: Option<f64>,
    pub message: Option<String>,
}

impl TransferSnapshot {
    /// snapshot written when a relay begins, before any byte arrived
    pub fn started() -> Self {
        Self {
            status: TransferStatus::Streaming,
            bytes_downloaded: 0,
            total_bytes: None,
            speed_bps: 0.0,
            progress: None,
            message: None,
        }
    }

    /// recompute the live metrics for `bytes_downloaded` after `elapsed_secs`
    pub fn streaming(bytes_downloaded: u64, total_bytes: Option<u64>, elapsed_secs: f64) -> Self {
        // zero elapsed time on the very first chunk reports no speed yet
        let speed_bps = if elapsed_secs > 0.0 {
            (bytes_downloaded as f64 * 8.0) / elapsed_secs
        } else {
            0.0
        };

        let progress = total_bytes
            .filter(|total| *total > 0)
            .map(|total| bytes_downloaded as f64 / total as f64 * 100.0);

        Self {
            status: TransferStatus::Streaming,
            bytes_downloaded,
            total_bytes: total_bytes.filter(|total| *total > 0),
            speed_bps,
            progress,
            message: None,
        }
    }

    /// same numbers, terminal `finished` status
    pub fn finished(mut self) -> Self {
        self.status = TransferStatus::Finished;
        self
    }

    /// same numbers, terminal `error` status carrying `message`
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = TransferStatus::Error;
        self.message = Some(message.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
