// Image codec: base64 transport payload -> in-memory RGB buffer
//
// Accepts an optional data-URL-style header ("<metadata>,<payload>");
// everything up to and including the first comma is discarded. The internal
// pixel convention is 8-bit RGB, applied consistently through redaction and
// inference preprocessing.

use crate::core::errors::{CodecError, CodecResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use tracing::trace;

/// Decode a base64 image payload into an RGB pixel buffer.
///
/// Fails with a `CodecError` when the payload is empty after stripping the
/// header, is not valid base64, or does not decode as an image. All of these
/// are client faults.
pub fn decode_image(payload: &str) -> CodecResult<RgbImage> {
    // Remove data URL prefix if present
    let payload = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let payload = payload.trim();

    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    let bytes = STANDARD.decode(payload)?;
    let image = image::load_from_memory(&bytes)?.to_rgb8();
    trace!("Decoded image: {}x{}", image.width(), image.height());
    Ok(image)
}
