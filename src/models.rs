use serde::{Deserialize, Serialize};

use crate::relay::RelayHead;
use crate::transfer::{TransferSnapshot, TransferStatus};
use crate::utils::format_mib;

const MIB: f64 = 1024.0 * 1024.0;

// query string carrying the target url
#[derive(Deserialize, Debug, Default)]
pub struct UrlQuery {
    pub url: Option<String>,
}

// json event pushed to progress observers
//
// streaming/finished events carry the numbers, error events carry a message
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SnapshotEvent {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SnapshotEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TransferStatus::Error.as_str(),
            speed_mbps: None,
            downloaded_mb: None,
            total_size_mb: None,
            progress: None,
            message: Some(message.into()),
        }
    }
}

impl From<&TransferSnapshot> for SnapshotEvent {
    fn from(snapshot: &TransferSnapshot) -> Self {
        if snapshot.status == TransferStatus::Error {
            return Self::error(snapshot.message.clone().unwrap_or_default());
        }

        Self {
            status: snapshot.status.as_str(),
            speed_mbps: Some(snapshot.speed_bps / MIB),
            downloaded_mb: Some(snapshot.bytes_downloaded as f64 / MIB),
            total_size_mb: snapshot.total_bytes.map(|total| total as f64 / MIB),
            progress: snapshot.progress,
            message: None,
        }
    }
}

// response for url info endpoint
#[derive(Serialize, Debug, PartialEq)]
pub struct UrlInfoResponse {
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub size_mb: String,
}

impl From<RelayHead> for UrlInfoResponse {
    fn from(head: RelayHead) -> Self {
        let size_mb = match head.content_length {
            Some(len) => format_mib(len),
            None => "Unknown (not specified by server)".to_string(),
        };

        Self {
            content_type: head.content_type.unwrap_or_else(|| "N/A".to_string()),
            size_bytes: head.content_length,
            size_mb,
        }
    }
}

// host resource usage
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub ram_percent: f64,
}

// generic error response
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
