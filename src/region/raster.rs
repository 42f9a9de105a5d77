use crate::error::RasterError;
use crate::region::geometry::Rect;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use imageproc::rect::Rect as PixelRect;
use log::debug;
use std::sync::Arc;

const JPEG_QUALITY: u8 = 92;

/// A still image encoded once and never mutated afterwards.
#[derive(Clone, PartialEq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn decode(&self) -> Result<DynamicImage, RasterError> {
        Ok(image::load_from_memory(&self.bytes)?)
    }
}

/// Cut `rect` (natural pixel space) out of `source` and encode it as JPEG.
///
/// The output resolution is the natural pixel extent of the selection,
/// independent of how large the image is currently rendered.
pub fn rasterize(source: Option<&DynamicImage>, rect: Rect) -> Result<EncodedImage, RasterError> {
    let source = source.ok_or(RasterError::ImageNotReady)?;
    let pixel_rect = clamp_to_image(source, rect)?;

    let cutout = get_cutout_image(source, &pixel_rect);
    encode_jpeg(&cutout)
}

/// Encode the complete image, used when no region was captured.
pub fn rasterize_whole(source: Option<&DynamicImage>) -> Result<EncodedImage, RasterError> {
    let source = source.ok_or(RasterError::ImageNotReady)?;
    encode_jpeg(source)
}

fn clamp_to_image(image: &DynamicImage, rect: Rect) -> Result<PixelRect, RasterError> {
    let (width, height) = (image.width() as f32, image.height() as f32);

    let left = rect.x.round().clamp(0.0, width);
    let top = rect.y.round().clamp(0.0, height);
    let right = (rect.x + rect.width).round().clamp(0.0, width);
    let bottom = (rect.y + rect.height).round().clamp(0.0, height);

    let w = (right - left).max(0.0) as u32;
    let h = (bottom - top).max(0.0) as u32;
    if w == 0 || h == 0 {
        return Err(RasterError::EmptyRegion {
            width: w,
            height: h,
        });
    }

    Ok(PixelRect::at(left as i32, top as i32).of_size(w, h))
}

fn get_cutout_image(image: &DynamicImage, rect: &PixelRect) -> DynamicImage {
    image.crop_imm(
        rect.left() as u32,
        rect.top() as u32,
        rect.width(),
        rect.height(),
    )
}

fn encode_jpeg(image: &DynamicImage) -> Result<EncodedImage, RasterError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    debug!(
        "Encoded {}x{} raster, {} KB",
        rgb.width(),
        rgb.height(),
        buf.len() / 1024
    );

    Ok(EncodedImage {
        bytes: buf.into(),
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn test_image() -> DynamicImage {
        let image = RgbImage::from_fn(400, 300, |x, _| {
            if x < 200 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        DynamicImage::ImageRgb8(image)
    }

    #[test]
    fn raster_has_natural_extent() {
        let image = test_image();
        let raster = rasterize(Some(&image), Rect::new(10.0, 20.0, 120.0, 80.0)).unwrap();

        assert_eq!((raster.width(), raster.height()), (120, 80));
        let decoded = raster.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[test]
    fn raster_takes_pixels_from_selection() {
        let image = test_image();
        let raster = rasterize(Some(&image), Rect::new(250.0, 0.0, 100.0, 100.0)).unwrap();

        let pixel = raster.decode().unwrap().to_rgb8().get_pixel(50, 50).0;
        assert!(pixel[2] > 200 && pixel[0] < 60, "expected blue, got {pixel:?}");
    }

    #[test]
    fn selection_is_clamped_to_image() {
        let image = test_image();
        let raster = rasterize(Some(&image), Rect::new(350.0, 250.0, 100.0, 100.0)).unwrap();
        assert_eq!((raster.width(), raster.height()), (50, 50));
    }

    #[test]
    fn selection_outside_image_is_empty() {
        let image = test_image();
        let result = rasterize(Some(&image), Rect::new(500.0, 10.0, 20.0, 20.0));
        assert!(matches!(result, Err(RasterError::EmptyRegion { .. })));
    }

    #[test]
    fn not_decoded_image_is_not_ready() {
        let result = rasterize(None, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(matches!(result, Err(RasterError::ImageNotReady)));
        assert!(matches!(rasterize_whole(None), Err(RasterError::ImageNotReady)));
    }

    #[test]
    fn whole_image_is_base64_jpeg() {
        let image = test_image();
        let raster = rasterize_whole(Some(&image)).unwrap();
        assert_eq!((raster.width(), raster.height()), (400, 300));
        // JPEG SOI marker
        assert_eq!(&raster.bytes()[..2], &[0xFF, 0xD8]);
        assert!(raster.to_base64().starts_with("/9j/"));
    }
}
