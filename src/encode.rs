//! Frame encoding — stride-aware crop plus lossy compression.
//!
//! Renderers hand back buffers with row padding: `row_stride` can exceed
//! `pixel_stride * width`. The encoder materializes the padded pixel grid,
//! crops the padding columns off, converts to RGB, and JPEG-encodes the
//! result for base64 transport.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use serde::Serialize;

use crate::error::CaptureError;
use crate::host::{DisplayGeometry, RawFrame, BYTES_PER_PIXEL};

/// Lossy compression level used for the transported image.
pub const JPEG_QUALITY: u8 = 80;

/// One encoded screenshot, as delivered to the bridge caller.
///
/// `width` and `height` are the post-crop display dimensions, never the
/// padded buffer width. `size` is the JPEG byte length before base64.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

/// Convert a raw frame into a [`CaptureResult`].
///
/// The frame is consumed; its buffer is released on every path, success or
/// failure. Fails with `ConversionError` on any format mismatch.
pub fn encode_frame(
    frame: RawFrame,
    geometry: &DisplayGeometry,
    quality: u8,
) -> Result<CaptureResult, CaptureError> {
    let RawFrame { data, row_stride, pixel_stride } = frame;
    let width = geometry.width;
    let height = geometry.height;

    if width == 0 || height == 0 {
        return Err(CaptureError::ConversionError(format!(
            "cannot encode an empty {width}x{height} frame"
        )));
    }
    if pixel_stride != BYTES_PER_PIXEL {
        return Err(CaptureError::ConversionError(format!(
            "unexpected pixel stride {pixel_stride}, expected {BYTES_PER_PIXEL} (RGBA)"
        )));
    }
    let row_bytes = pixel_stride * width as usize;
    if row_stride < row_bytes {
        return Err(CaptureError::ConversionError(format!(
            "row stride {row_stride} is smaller than one row of pixels ({row_bytes})"
        )));
    }
    let needed = row_stride * height as usize;
    if data.len() < needed {
        return Err(CaptureError::ConversionError(format!(
            "frame buffer holds {} bytes, expected {needed}",
            data.len()
        )));
    }

    let padding_pixels = (row_stride - row_bytes) / pixel_stride;
    let padded_width = width + padding_pixels as u32;
    let padded_row_bytes = padded_width as usize * pixel_stride;

    // Materialize the padded grid. When the stride is an exact pixel
    // multiple the buffer already is that grid; otherwise the stride has
    // trailing sub-pixel bytes and rows must be repacked.
    let grid = if row_stride == padded_row_bytes {
        let mut grid = data;
        grid.truncate(padded_row_bytes * height as usize);
        grid
    } else {
        let mut grid = Vec::with_capacity(padded_row_bytes * height as usize);
        for row in data.chunks(row_stride).take(height as usize) {
            grid.extend_from_slice(&row[..padded_row_bytes]);
        }
        grid
    };

    let padded = RgbaImage::from_raw(padded_width, height, grid).ok_or_else(|| {
        CaptureError::ConversionError("pixel grid does not match the padded dimensions".into())
    })?;
    let cropped = DynamicImage::ImageRgba8(padded).crop_imm(0, 0, width, height);

    // JPEG carries no alpha channel.
    let rgb = cropped.to_rgb8();
    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), quality))
        .map_err(|e| CaptureError::ConversionError(format!("jpeg encoding failed: {e}")))?;

    // No line wrapping; the bridge transports the payload as a single token.
    let base64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &jpeg);
    let size = jpeg.len();

    Ok(CaptureResult { base64, width, height, size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn geometry(width: u32, height: u32) -> DisplayGeometry {
        DisplayGeometry { width, height, density_factor: 2.0 }
    }

    /// A frame whose rows carry `padding_px` extra pixels of renderer
    /// padding, filled with a marker color so crop failures would show up.
    fn padded_frame(width: u32, height: u32, padding_px: usize) -> RawFrame {
        let row_stride = (width as usize + padding_px) * 4;
        let mut data = vec![0u8; row_stride * height as usize];
        for row in 0..height as usize {
            for col in 0..(width as usize + padding_px) {
                let at = row * row_stride + col * 4;
                let value = if col < width as usize { 40 } else { 255 };
                data[at] = value;
                data[at + 1] = value;
                data[at + 2] = value;
                data[at + 3] = 255;
            }
        }
        RawFrame { data, row_stride, pixel_stride: 4 }
    }

    #[test]
    fn padding_columns_are_cropped_off() {
        // row_stride 260 with pixel_stride 4 and width 64 leaves exactly
        // one padding pixel per row.
        let frame = padded_frame(64, 32, 1);
        assert_eq!(frame.row_stride, 260);

        let result = encode_frame(frame, &geometry(64, 32), JPEG_QUALITY).unwrap();
        assert_eq!(result.width, 64);
        assert_eq!(result.height, 32);

        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(&result.base64)
            .expect("payload is valid base64");
        let decoded = image::load_from_memory(&jpeg).expect("payload is a decodable image");
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 32);
    }

    #[test]
    fn unpadded_frames_encode_as_is() {
        let result = encode_frame(padded_frame(16, 8, 0), &geometry(16, 8), JPEG_QUALITY).unwrap();
        assert_eq!((result.width, result.height), (16, 8));
        assert!(result.size > 0);
    }

    #[test]
    fn size_matches_the_decoded_payload() {
        let result = encode_frame(padded_frame(16, 8, 2), &geometry(16, 8), JPEG_QUALITY).unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD.decode(&result.base64).unwrap();
        assert_eq!(result.size, jpeg.len());
        // JPEG start-of-image marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn base64_payload_has_no_line_breaks() {
        let result = encode_frame(padded_frame(64, 64, 1), &geometry(64, 64), JPEG_QUALITY).unwrap();
        assert!(!result.base64.contains('\n'));
        assert!(!result.base64.contains('\r'));
    }

    #[test]
    fn rejects_a_wrong_pixel_stride() {
        let frame = RawFrame { data: vec![0; 16 * 8 * 3], row_stride: 16 * 3, pixel_stride: 3 };
        let err = encode_frame(frame, &geometry(16, 8), JPEG_QUALITY).unwrap_err();
        assert!(matches!(err, CaptureError::ConversionError(_)));
    }

    #[test]
    fn rejects_a_truncated_buffer() {
        let mut frame = padded_frame(16, 8, 1);
        frame.data.truncate(frame.data.len() / 2);
        let err = encode_frame(frame, &geometry(16, 8), JPEG_QUALITY).unwrap_err();
        assert!(matches!(err, CaptureError::ConversionError(_)));
    }

    #[test]
    fn rejects_a_row_stride_below_the_row_width() {
        let frame = RawFrame { data: vec![0; 1024], row_stride: 32, pixel_stride: 4 };
        let err = encode_frame(frame, &geometry(16, 8), JPEG_QUALITY).unwrap_err();
        assert!(matches!(err, CaptureError::ConversionError(_)));
    }

    #[test]
    fn bridge_payload_shape_is_stable() {
        let result = encode_frame(padded_frame(8, 4, 0), &geometry(8, 4), JPEG_QUALITY).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        for key in ["base64", "width", "height", "size"] {
            assert!(obj.contains_key(key), "payload is missing `{key}`");
        }
    }
}
