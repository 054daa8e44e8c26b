//! Image fetch-and-slice pipeline.

mod http;
mod slice;

pub use http::{HttpImageSlicer, ImageSlicerConfig};
pub use slice::slice_image;
