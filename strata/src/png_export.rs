//! PNG export filter. RGBA8 and GRAYA8 are written as-is, other color spaces go through RGBA8.

use std::borrow::Cow;
use std::sync::Arc;

use strata_core::colorspace::{self, builtin};
use strata_core::device::PixelBuffer;
use strata_core::export::{ExportError, ExportFilter};

pub struct PngExportFilter;
impl PngExportFilter {
    fn unsupported(pixels: &PixelBuffer) -> ExportError {
        ExportError::UnsupportedColorSpace {
            filter: "png".to_owned(),
            color_space: pixels.color_space().id().to_owned(),
        }
    }
}
impl ExportFilter for PngExportFilter {
    fn id(&self) -> &str {
        "png"
    }
    fn name(&self) -> &str {
        "Portable Network Graphics"
    }
    fn mime_types(&self) -> &[&str] {
        &["image/png"]
    }
    fn extensions(&self) -> &[&str] {
        &["png"]
    }
    fn export(&self, pixels: &PixelBuffer, out: &mut dyn std::io::Write) -> Result<(), ExportError> {
        let (pixels, color) = match pixels.color_space().id() {
            builtin::RGBA8 => (Cow::Borrowed(pixels), png::ColorType::Rgba),
            builtin::GRAYA8 => (Cow::Borrowed(pixels), png::ColorType::GrayscaleAlpha),
            _ => {
                let registry = colorspace::global();
                let rgba = registry
                    .get(builtin::RGBA8)
                    .unwrap_or_else(|| Arc::new(builtin::rgba8()));
                let converted = pixels
                    .convert(&rgba, registry)
                    .map_err(|_| Self::unsupported(pixels))?;
                (Cow::Owned(converted), png::ColorType::Rgba)
            }
        };
        let rect = pixels.rect();
        let mut encoder = png::Encoder::new(out, rect.width(), rect.height());
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let encode = |e: png::EncodingError| ExportError::Encode(e.to_string());
        let mut writer = encoder.write_header().map_err(encode)?;
        writer.write_image_data(pixels.data()).map_err(encode)?;
        writer.finish().map_err(encode)?;
        Ok(())
    }
}
