//! Shared API response models

use crate::stream_controller::{DetectionSnapshot, StreamState, TerminationReason};
use serde::{Deserialize, Serialize};

/// Success envelope; failures are rendered by `Error::into_response`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub stream: StreamState,
    pub last_termination: Option<TerminationReason>,
    pub snapshot: DetectionSnapshot,
    pub subscribers: usize,
    pub dropped_jobs: u64,
}

/// Current counts plus stream state
#[derive(Debug, Clone, Serialize)]
pub struct DetectionsResponse {
    pub streaming: bool,
    #[serde(flatten)]
    pub snapshot: DetectionSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_shape() {
        let ok = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "data": 1}));
    }

    #[test]
    fn test_detections_response_is_flat() {
        let resp = DetectionsResponse {
            streaming: true,
            snapshot: DetectionSnapshot::empty(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["streaming"], true);
        assert_eq!(json["frame"], 0);
        assert_eq!(json["counts"]["person"], 0);
    }
}
