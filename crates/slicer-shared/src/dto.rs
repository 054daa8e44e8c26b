//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// Request to slice an image, accepted by both processing routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageRequest {
    pub url: String,
    pub chunk_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_width: Option<u32>,
}

/// One encoded chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDto {
    pub index: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    /// `data:image/png;base64,...`
    pub data_url: String,
}

/// Response for a sliced image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageResponse {
    pub original_url: String,
    pub total_width: u32,
    pub total_height: u32,
    pub chunk_height: u32,
    pub resize_width: Option<u32>,
    pub chunk_count: usize,
    pub chunks: Vec<ChunkDto>,
    pub processing_time_ms: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub api_key_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case_and_optional_width() {
        let req: ProcessImageRequest =
            serde_json::from_str(r#"{"url":"https://example.com/a.png","chunkHeight":300}"#).unwrap();
        assert_eq!(req.chunk_height, 300);
        assert_eq!(req.resize_width, None);
    }

    #[test]
    fn test_health_response_shape() {
        let body = serde_json::to_value(HealthResponse {
            status: "ok".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            api_key_configured: false,
        })
        .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["apiKeyConfigured"], false);
    }

    #[test]
    fn test_response_serializes_null_resize_width() {
        let body = serde_json::to_value(ProcessImageResponse {
            original_url: "https://example.com/a.png".to_string(),
            total_width: 10,
            total_height: 20,
            chunk_height: 10,
            resize_width: None,
            chunk_count: 0,
            chunks: Vec::new(),
            processing_time_ms: 3,
        })
        .unwrap();

        assert!(body["resizeWidth"].is_null());
        assert_eq!(body["processingTimeMs"], 3);
        assert_eq!(body["chunkCount"], 0);
    }
}
