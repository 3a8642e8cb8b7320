use std::sync::Arc;

use super::DeviceError;
use crate::colorspace::{ColorSpace, Registry};
use crate::util::Rect;

/// A dense, row-major block of pixels covering `rect`, in absolute image coordinates.
#[derive(Clone)]
pub struct PixelBuffer {
    rect: Rect,
    color_space: Arc<ColorSpace>,
    data: Vec<u8>,
}
impl PixelBuffer {
    /// A fully transparent (all zero) buffer.
    pub fn new(rect: Rect, color_space: Arc<ColorSpace>) -> Result<Self, DeviceError> {
        let len = byte_len(rect, color_space.pixel_size())?;
        let mut data = try_alloc(len)?;
        data.resize(len, 0);
        Ok(Self {
            rect,
            color_space,
            data,
        })
    }
    /// A buffer where every pixel is `pixel`.
    pub fn filled(
        rect: Rect,
        color_space: Arc<ColorSpace>,
        pixel: &[u8],
    ) -> Result<Self, DeviceError> {
        if pixel.len() != color_space.pixel_size() {
            return Err(DeviceError::BadLength {
                expected: color_space.pixel_size(),
                found: pixel.len(),
            });
        }
        let len = byte_len(rect, pixel.len())?;
        let mut data = try_alloc(len)?;
        data.extend(pixel.iter().copied().cycle().take(len));
        Ok(Self {
            rect,
            color_space,
            data,
        })
    }
    /// Wrap existing data, which must hold exactly `rect`'s pixels.
    pub fn from_raw(
        rect: Rect,
        color_space: Arc<ColorSpace>,
        data: Vec<u8>,
    ) -> Result<Self, DeviceError> {
        let expected = byte_len(rect, color_space.pixel_size())?;
        if data.len() != expected {
            return Err(DeviceError::BadLength {
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            rect,
            color_space,
            data,
        })
    }
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }
    #[must_use]
    pub fn color_space(&self) -> &Arc<ColorSpace> {
        &self.color_space
    }
    #[must_use]
    pub fn pixel_size(&self) -> usize {
        self.color_space.pixel_size()
    }
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
    /// Bytes per row.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.rect.width() as usize * self.pixel_size()
    }
    fn offset_of(&self, x: i32, y: i32) -> Option<usize> {
        if !self.rect.contains_point(x, y) {
            return None;
        }
        let col = x.abs_diff(self.rect.left()) as usize;
        let row = y.abs_diff(self.rect.top()) as usize;
        Some(row * self.stride() + col * self.pixel_size())
    }
    /// The pixel at absolute coordinates, or `None` outside of [`Self::rect`].
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<&[u8]> {
        let start = self.offset_of(x, y)?;
        self.data.get(start..start + self.pixel_size())
    }
    pub fn pixel_mut(&mut self, x: i32, y: i32) -> Option<&mut [u8]> {
        let start = self.offset_of(x, y)?;
        let size = self.pixel_size();
        self.data.get_mut(start..start + size)
    }
    /// The pixels of row `y` between absolute columns `left..right`. Both must lie within the buffer.
    #[must_use]
    pub fn span(&self, y: i32, left: i32, right: i32) -> &[u8] {
        let start = self.offset_of(left, y).unwrap_or(0);
        let len = right.abs_diff(left) as usize * self.pixel_size();
        &self.data[start..start + len]
    }
    pub fn span_mut(&mut self, y: i32, left: i32, right: i32) -> &mut [u8] {
        let start = self.offset_of(left, y).unwrap_or(0);
        let len = right.abs_diff(left) as usize * self.pixel_size();
        &mut self.data[start..start + len]
    }
    /// Copy the overlapping area of `other` into `self`. Both must share a color space.
    pub fn copy_from(&mut self, other: &Self) -> Result<(), DeviceError> {
        super::check_space(&self.color_space, &other.color_space)?;
        let overlap = self.rect.intersection(&other.rect);
        for y in overlap.top()..overlap.bottom() {
            self.span_mut(y, overlap.left(), overlap.right())
                .copy_from_slice(other.span(y, overlap.left(), overlap.right()));
        }
        Ok(())
    }
    /// A copy of this buffer in another color space.
    pub fn convert(
        &self,
        target: &Arc<ColorSpace>,
        registry: &Registry,
    ) -> Result<Self, DeviceError> {
        let conversion = registry.conversion(&self.color_space, target)?;
        let mut out = Self::new(self.rect, target.clone())?;
        conversion.convert(
            &self.data,
            self.pixel_size(),
            &mut out.data,
            target.pixel_size(),
        );
        Ok(out)
    }
}
impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("rect", &self.rect)
            .field("color_space", &self.color_space.id())
            .finish_non_exhaustive()
    }
}

fn byte_len(rect: Rect, pixel_size: usize) -> Result<usize, DeviceError> {
    usize::try_from(rect.area())
        .ok()
        .and_then(|area| area.checked_mul(pixel_size))
        .ok_or(DeviceError::Allocation { bytes: usize::MAX })
}
fn try_alloc(len: usize) -> Result<Vec<u8>, DeviceError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| DeviceError::Allocation { bytes: len })?;
    Ok(data)
}

#[cfg(test)]
mod test {
    use super::PixelBuffer;
    use crate::colorspace::{builtin, global};
    use crate::device::DeviceError;
    use crate::util::Rect;

    #[test]
    fn absolute_addressing() {
        let rgba = global().get(builtin::RGBA8).unwrap();
        let mut buffer = PixelBuffer::new(Rect::new(-2, 10, 4, 3), rgba).unwrap();
        assert_eq!(buffer.data().len(), 4 * 3 * 4);
        buffer.pixel_mut(-1, 11).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.pixel(-1, 11), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(buffer.pixel(-3, 11), None);
        assert_eq!(buffer.span(11, -2, 0), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }
    #[test]
    fn rejects_bad_sizes() {
        let rgba = global().get(builtin::RGBA8).unwrap();
        let rect = Rect::new(0, 0, 2, 2);
        assert!(matches!(
            PixelBuffer::from_raw(rect, rgba.clone(), vec![0; 15]),
            Err(DeviceError::BadLength {
                expected: 16,
                found: 15
            })
        ));
        assert!(matches!(
            PixelBuffer::filled(rect, rgba, &[1, 2]),
            Err(DeviceError::BadLength { .. })
        ));
    }
    #[test]
    fn convert_to_gray() {
        let registry = global();
        let rgba = registry.get(builtin::RGBA8).unwrap();
        let gray = registry.get(builtin::GRAYA8).unwrap();
        let buffer = PixelBuffer::filled(Rect::new(0, 0, 2, 1), rgba, &[0, 255, 0, 99]).unwrap();
        let converted = buffer.convert(&gray, registry).unwrap();
        assert_eq!(converted.data(), &[150, 99, 150, 99]);
    }
}
