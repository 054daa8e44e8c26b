//! Image slicing port.

use async_trait::async_trait;

use crate::domain::{SliceRequest, SlicedImage};

/// Fetches an image and splits it into fixed-height chunks.
#[async_trait]
pub trait ImageSlicer: Send + Sync {
    async fn slice(&self, request: &SliceRequest) -> Result<SlicedImage, SliceError>;
}

/// Image pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Image host responded with status {0}")]
    UpstreamStatus(u16),

    #[error("Image exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode chunk: {0}")]
    Encode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
