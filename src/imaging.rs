//! Frame conversion, JPEG output and preview overlays.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::traits::{CameraError, Format, FourCC, Frame, Result};

/// Layer the camera preview is drawn on. Overlays on a lower or equal layer are hidden behind it.
pub const PREVIEW_LAYER: u32 = 2;

/// Convert a captured frame to an RGB image.
///
/// YUYV and RGB3 frames are unpacked row by row honouring the stride,
/// MJPG/JPEG frames are decoded.
///
/// # Errors
///
/// Returns `StreamError` when the frame holds fewer rows than the format
/// promises, `FormatNotSupported` for formats that are not stills (H.264),
/// and `Image` when a JPEG frame fails to decode.
pub fn frame_to_rgb(frame: &Frame, format: &Format) -> Result<RgbImage> {
    match format.fourcc {
        FourCC::YUYV => unpack_rows(frame, format, 2, |packed, out| {
            for pair in packed.chunks_exact(4) {
                if let [y0, u, y1, v] = *pair {
                    let (r, g, b) = yuv_to_rgb(y0, u, v);
                    out.extend_from_slice(&[r, g, b]);
                    let (r, g, b) = yuv_to_rgb(y1, u, v);
                    out.extend_from_slice(&[r, g, b]);
                }
            }
        }),
        FourCC::RGB3 => unpack_rows(frame, format, 3, |packed, out| {
            out.extend_from_slice(packed);
        }),
        FourCC::MJPG | FourCC::JPEG => {
            let decoded = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)?;
            Ok(decoded.to_rgb8())
        }
        _ => Err(CameraError::FormatNotSupported(format.clone())),
    }
}

fn unpack_rows<F>(
    frame: &Frame,
    format: &Format,
    bytes_per_pixel: u32,
    unpack: F,
) -> Result<RgbImage>
where
    F: Fn(&[u8], &mut Vec<u8>),
{
    let row_bytes = (format.width * bytes_per_pixel) as usize;
    let stride = (format.stride as usize).max(row_bytes);
    if row_bytes == 0 {
        return Err(CameraError::StreamError(format!(
            "Empty frame geometry {}x{}",
            format.width, format.height
        )));
    }

    let mut rgb = Vec::with_capacity((format.width * format.height * 3) as usize);
    let mut rows = 0u32;
    for row in frame.data.chunks(stride).take(format.height as usize) {
        let Some(packed) = row.get(..row_bytes) else {
            break;
        };
        unpack(packed, &mut rgb);
        rows += 1;
    }

    if rows < format.height {
        return Err(CameraError::StreamError(format!(
            "Short frame {}: {rows} of {} rows present",
            frame.metadata.sequence, format.height
        )));
    }

    RgbImage::from_raw(format.width, format.height, rgb).ok_or_else(|| {
        CameraError::StreamError(format!(
            "Frame {} does not fill {}x{}",
            frame.metadata.sequence, format.width, format.height
        ))
    })
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula. Values are clamped to 0-255.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

/// Encode an image as JPEG into any writer.
pub fn write_jpeg<W: Write>(image: &RgbImage, writer: W, quality: u8) -> Result<()> {
    JpegEncoder::new_with_quality(writer, quality).encode_image(image)?;
    Ok(())
}

/// Encode an image as JPEG into a file, replacing it if present.
pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_jpeg(image, &mut writer, quality)?;
    writer.flush()?;
    Ok(())
}

/// Scale an image to exactly `width` x `height`.
#[must_use]
pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Size of the padded overlay buffer: width rounded up to 32, height to 16.
#[must_use]
pub const fn padded_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(32) * 32, height.div_ceil(16) * 16)
}

/// An RGB image laid over the preview.
///
/// The source buffer is padded to the block size the renderer expects while
/// the visible area keeps the original image's dimensions.
#[derive(Debug, Clone)]
pub struct Overlay {
    source: RgbImage,
    width: u32,
    height: u32,
    /// Opacity, 0 (transparent) to 255 (opaque).
    pub alpha: u8,
    /// Drawing layer; only layers above [`PREVIEW_LAYER`] are visible.
    pub layer: u32,
}

impl Overlay {
    /// Build an opaque overlay on layer 0 from an arbitrarily sized image.
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let (padded_width, padded_height) = padded_dimensions(width, height);

        let mut source = RgbImage::new(padded_width, padded_height);
        imageops::replace(&mut source, &rgb, 0, 0);

        Self {
            source,
            width,
            height,
            alpha: 255,
            layer: 0,
        }
    }

    /// Load the overlay image from disk.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_image(&image::open(path)?))
    }

    /// Visible size (the original image's dimensions).
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Size of the padded source buffer.
    #[must_use]
    pub fn padded_size(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    /// Blend the overlay onto the top-left corner of a preview frame.
    ///
    /// Returns `false` and leaves the frame untouched when the overlay sits
    /// beneath the preview layer.
    pub fn composite_onto(&self, frame: &mut RgbImage) -> bool {
        if self.layer <= PREVIEW_LAYER {
            return false;
        }

        let alpha = u16::from(self.alpha);
        let width = self.width.min(frame.width());
        let height = self.height.min(frame.height());
        for y in 0..height {
            for x in 0..width {
                let Some(src) = self.source.get_pixel_checked(x, y) else {
                    continue;
                };
                let Some(dst) = frame.get_pixel_mut_checked(x, y) else {
                    continue;
                };
                for (out, over) in dst.0.iter_mut().zip(src.0) {
                    let blended =
                        (u16::from(over) * alpha + u16::from(*out) * (255 - alpha) + 127) / 255;
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        *out = blended as u8;
                    }
                }
            }
        }
        true
    }
}
