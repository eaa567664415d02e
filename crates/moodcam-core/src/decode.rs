//! Frame decoding: data-URI / raw bytes into an RGB pixel grid.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image buffer is empty")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// A decoded 3-channel frame. Width and height are always non-zero.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    image: RgbImage,
}

impl PixelGrid {
    pub fn from_rgb(image: RgbImage) -> Result<Self, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::ZeroDimensions);
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Luma copy of the frame (ITU-R BT.709 weights, as computed by `image`).
    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

/// Where a request's image bytes came from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// `data:image/...;base64,<payload>` from an in-browser capture.
    DataUri(String),
    /// Raw file body from a multipart upload.
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn decode(&self) -> Result<PixelGrid, DecodeError> {
        match self {
            ImageSource::DataUri(uri) => decode_data_uri(uri),
            ImageSource::Bytes(bytes) => decode_image(bytes),
        }
    }
}

/// Decode an encoded image (JPEG, PNG, WebP, ...) into an RGB grid.
pub fn decode_image(bytes: &[u8]) -> Result<PixelGrid, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let decoded = image::load_from_memory(bytes)?;
    PixelGrid::from_rgb(decoded.to_rgb8())
}

/// Decode a base64 data URI. The header up to the first comma is dropped;
/// a bare base64 payload without header is accepted as well.
pub fn decode_data_uri(uri: &str) -> Result<PixelGrid, DecodeError> {
    let payload = match uri.split_once(',') {
        Some((_header, payload)) => payload,
        None => uri,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = STANDARD.decode(payload)?;
    decode_image(&bytes)
}
