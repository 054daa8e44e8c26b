use crate::error::DomainError;

/// A request to split a remote image into fixed-height chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    pub url: String,
    pub chunk_height: u32,
    /// Resize to this width first, keeping the aspect ratio.
    pub resize_width: Option<u32>,
}

impl SliceRequest {
    pub fn new(
        url: impl Into<String>,
        chunk_height: u32,
        resize_width: Option<u32>,
    ) -> Result<Self, DomainError> {
        let url = url.into().trim().to_string();

        if url.is_empty() {
            return Err(DomainError::Validation("url is required".to_string()));
        }
        if chunk_height == 0 {
            return Err(DomainError::Validation(
                "chunkHeight must be greater than zero".to_string(),
            ));
        }
        if resize_width == Some(0) {
            return Err(DomainError::Validation(
                "resizeWidth must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            url,
            chunk_height,
            resize_width,
        })
    }
}

/// One encoded horizontal band of the source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChunk {
    pub index: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

/// Result of slicing an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicedImage {
    pub original_url: String,
    /// Width after the optional resize.
    pub total_width: u32,
    /// Height after the optional resize.
    pub total_height: u32,
    pub chunk_height: u32,
    pub resize_width: Option<u32>,
    pub chunks: Vec<ImageChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_request_validation() {
        assert!(SliceRequest::new("https://example.com/a.png", 100, None).is_ok());
        assert!(SliceRequest::new("  ", 100, None).is_err());
        assert!(SliceRequest::new("https://example.com/a.png", 0, None).is_err());
        assert!(SliceRequest::new("https://example.com/a.png", 10, Some(0)).is_err());
    }

    #[test]
    fn test_slice_request_trims_url() {
        let req = SliceRequest::new(" https://example.com/a.png\n", 50, Some(640)).unwrap();
        assert_eq!(req.url, "https://example.com/a.png");
        assert_eq!(req.resize_width, Some(640));
    }
}
