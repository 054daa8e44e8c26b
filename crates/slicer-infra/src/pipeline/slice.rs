//! Pure resize-and-crop step of the pipeline.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use slicer_core::domain::ImageChunk;
use slicer_core::ports::SliceError;

/// Reject images whose pixel count exceeds `max_pixels`.
pub fn check_pixel_budget(width: u32, height: u32, max_pixels: u64) -> Result<(), SliceError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(SliceError::InvalidRequest(format!(
            "{width}x{height} image has {pixels} pixels, the limit is {max_pixels}"
        )));
    }
    Ok(())
}

/// Split `image` into bands of `chunk_height` rows, resizing to `resize_width` first.
///
/// The last band holds whatever rows remain. Both the source and the resized
/// image must stay within `max_pixels`. Returns the final dimensions and the
/// PNG-encoded chunks as data URLs.
pub fn slice_image(
    image: DynamicImage,
    chunk_height: u32,
    resize_width: Option<u32>,
    max_pixels: u64,
) -> Result<(u32, u32, Vec<ImageChunk>), SliceError> {
    if chunk_height == 0 {
        return Err(SliceError::InvalidRequest(
            "chunk height must be greater than zero".to_string(),
        ));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SliceError::Decode("image has no pixels".to_string()));
    }
    check_pixel_budget(width, height, max_pixels)?;

    let image = match resize_width {
        Some(target) if target != width => {
            let scaled = (u64::from(height) * u64::from(target) / u64::from(width)).max(1);
            let scaled = u32::try_from(scaled)
                .map_err(|_| SliceError::InvalidRequest("resized image is too tall".to_string()))?;
            // Checked before resize_exact allocates the target buffer
            check_pixel_budget(target, scaled, max_pixels)?;
            image.resize_exact(target, scaled, FilterType::Lanczos3)
        }
        _ => image,
    };

    let (width, height) = image.dimensions();
    let mut chunks = Vec::with_capacity(height.div_ceil(chunk_height) as usize);
    let mut offset_y = 0;

    while offset_y < height {
        let band = chunk_height.min(height - offset_y);
        let chunk = image.crop_imm(0, offset_y, width, band);

        chunks.push(ImageChunk {
            index: chunks.len() as u32,
            offset_y,
            width,
            height: band,
            data_url: encode_png_data_url(&chunk)?,
        });

        offset_y += band;
    }

    Ok((width, height, chunks))
}

fn encode_png_data_url(image: &DynamicImage) -> Result<String, SliceError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| SliceError::Encode(e.to_string()))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner())))
}
