//! HTTP image slicer - fetches over `reqwest`, slices on the blocking pool.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageReader};
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};

use slicer_core::domain::{SliceRequest, SlicedImage};
use slicer_core::ports::{ImageSlicer, SliceError};

use super::slice::{check_pixel_budget, slice_image};

/// Some image hosts reject non-browser clients with 403.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// Image pipeline configuration.
#[derive(Debug, Clone)]
pub struct ImageSlicerConfig {
    /// Total time allowed for one fetch attempt.
    pub fetch_timeout: Duration,
    /// Largest accepted download, in bytes.
    pub max_image_bytes: usize,
    pub max_chunk_height: u32,
    pub max_resize_width: u32,
    /// Pixel ceiling for both the decoded source and the resized output.
    pub max_output_pixels: u64,
    pub user_agent: String,
}

impl Default for ImageSlicerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
            max_image_bytes: 20 * 1024 * 1024,
            max_chunk_height: 10_000,
            max_resize_width: 4096,
            max_output_pixels: 40_000_000,
            user_agent: concat!("image-slicer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ImageSlicerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            fetch_timeout: std::env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            max_image_bytes: std::env::var("MAX_IMAGE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_image_bytes),
            max_chunk_height: std::env::var("MAX_CHUNK_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_chunk_height),
            max_resize_width: std::env::var("MAX_RESIZE_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_resize_width),
            max_output_pixels: std::env::var("MAX_OUTPUT_PIXELS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_output_pixels),
            user_agent: defaults.user_agent,
        }
    }
}

/// [`ImageSlicer`] that downloads the source image itself.
pub struct HttpImageSlicer {
    client: Client,
    config: ImageSlicerConfig,
}

impl HttpImageSlicer {
    pub fn new(config: ImageSlicerConfig) -> Result<Self, SliceError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SliceError::Internal(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn validate(&self, request: &SliceRequest) -> Result<Url, SliceError> {
        let url = Url::parse(&request.url)
            .map_err(|e| SliceError::InvalidRequest(format!("invalid url: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(SliceError::InvalidRequest(
                "only http and https urls are supported".to_string(),
            ));
        }
        if request.chunk_height > self.config.max_chunk_height {
            return Err(SliceError::InvalidRequest(format!(
                "chunkHeight must be at most {}",
                self.config.max_chunk_height
            )));
        }
        if let Some(width) = request.resize_width {
            if width > self.config.max_resize_width {
                return Err(SliceError::InvalidRequest(format!(
                    "resizeWidth must be at most {}",
                    self.config.max_resize_width
                )));
            }
        }

        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, SliceError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SliceError::Fetch(e.to_string()))?;

        let response = if response.status() == StatusCode::FORBIDDEN {
            tracing::debug!(url = %url, "Image host answered 403, retrying with browser headers");
            self.client
                .get(url.clone())
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(ACCEPT, IMAGE_ACCEPT)
                .header(REFERER, referer_for(url))
                .send()
                .await
                .map_err(|e| SliceError::Fetch(e.to_string()))?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SliceError::UpstreamStatus(status.as_u16()));
        }

        self.read_body(response).await
    }

    async fn read_body(&self, mut response: Response) -> Result<Vec<u8>, SliceError> {
        let limit = self.config.max_image_bytes;

        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(SliceError::TooLarge { limit });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SliceError::Fetch(e.to_string()))?
        {
            if body.len() + chunk.len() > limit {
                return Err(SliceError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl ImageSlicer for HttpImageSlicer {
    async fn slice(&self, request: &SliceRequest) -> Result<SlicedImage, SliceError> {
        let url = self.validate(request)?;
        let bytes = self.fetch(&url).await?;

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched source image");

        let chunk_height = request.chunk_height;
        let resize_width = request.resize_width;
        let max_pixels = self.config.max_output_pixels;
        let (total_width, total_height, chunks) = tokio::task::spawn_blocking(move || {
            let image = decode_within_budget(&bytes, max_pixels)?;
            slice_image(image, chunk_height, resize_width, max_pixels)
        })
        .await
        .map_err(|e| SliceError::Internal(e.to_string()))??;

        Ok(SlicedImage {
            original_url: request.url.clone(),
            total_width,
            total_height,
            chunk_height,
            resize_width,
            chunks,
        })
    }
}

/// Decode `bytes`, refusing before allocation when the header declares too many pixels.
fn decode_within_budget(bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, SliceError> {
    let decode_err = |e: image::ImageError| SliceError::Decode(e.to_string());
    let reader = || {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| SliceError::Decode(e.to_string()))
    };

    let (width, height) = reader()?.into_dimensions().map_err(decode_err)?;
    check_pixel_budget(width, height, max_pixels)?;

    reader()?.decode().map_err(decode_err)
}

/// Same-origin referer, e.g. `https://cdn.example.com/`.
fn referer_for(url: &Url) -> String {
    format!("{}/", url.origin().ascii_serialization())
}
