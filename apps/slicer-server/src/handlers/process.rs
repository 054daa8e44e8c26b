//! Image processing endpoints.

use std::time::Instant;

use actix_web::{HttpResponse, web};
use slicer_core::domain::{SliceRequest, SlicedImage};
use slicer_core::ports::ImageSlicer;
use slicer_shared::dto::{ChunkDto, ProcessImageRequest, ProcessImageResponse};

use crate::middleware::{ApiKeyAuth, AppResult};
use crate::state::AppState;

/// Slice an image for the browser UI.
///
/// POST /api/process
pub async fn process_image(
    state: web::Data<AppState>,
    body: web::Json<ProcessImageRequest>,
) -> AppResult<HttpResponse> {
    let response = slice(state.slicer.as_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Slice an image for API clients. Requires `X-API-Key`.
///
/// POST /api/v1/process
pub async fn process_image_api(
    _auth: ApiKeyAuth,
    state: web::Data<AppState>,
    body: web::Json<ProcessImageRequest>,
) -> AppResult<HttpResponse> {
    let response = slice(state.slicer.as_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn slice(slicer: &dyn ImageSlicer, body: ProcessImageRequest) -> AppResult<ProcessImageResponse> {
    let started = Instant::now();
    let request = SliceRequest::new(body.url, body.chunk_height, body.resize_width)?;

    let sliced = slicer.slice(&request).await?;
    let elapsed = started.elapsed();

    tracing::info!(
        url = %sliced.original_url,
        width = sliced.total_width,
        height = sliced.total_height,
        chunks = sliced.chunks.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Image sliced"
    );

    Ok(to_response(sliced, elapsed.as_millis() as u64))
}

fn to_response(sliced: SlicedImage, processing_time_ms: u64) -> ProcessImageResponse {
    let chunks: Vec<ChunkDto> = sliced
        .chunks
        .into_iter()
        .map(|chunk| ChunkDto {
            index: chunk.index,
            offset_y: chunk.offset_y,
            width: chunk.width,
            height: chunk.height,
            data_url: chunk.data_url,
        })
        .collect();

    ProcessImageResponse {
        original_url: sliced.original_url,
        total_width: sliced.total_width,
        total_height: sliced.total_height,
        chunk_height: sliced.chunk_height,
        resize_width: sliced.resize_width,
        chunk_count: chunks.len(),
        chunks,
        processing_time_ms,
    }
}
