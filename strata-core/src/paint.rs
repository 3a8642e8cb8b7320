//! Painting pixels into a layer's device.

use std::borrow::Cow;

use crate::blend::Blend;
use crate::colorspace::{math, Registry};
use crate::device::{DeviceError, PaintDevice, PixelBuffer};
use crate::util::Rect;

/// Restrictions on what a paint operation may change.
#[derive(Copy, Clone, Debug, Default)]
pub struct PaintGuard<'a> {
    /// Keep the alpha already in the device, only color changes.
    pub alpha_locked: bool,
    /// Per-pixel protection over the painted rect, 255 leaves a pixel untouched.
    pub protection: Option<&'a [u8]>,
}

/// Composite `source` onto `device` with `blend`, returning the changed rect.
///
/// The source is converted into the device's color space first if needed.
pub fn paint(
    device: &mut PaintDevice,
    source: &PixelBuffer,
    blend: Blend,
    guard: PaintGuard<'_>,
    registry: &Registry,
) -> Result<Rect, DeviceError> {
    let rect = source.rect();
    if rect.is_empty() {
        return Ok(rect);
    }
    let space = device.color_space().clone();
    let source = if source.color_space() == &space {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(source.convert(&space, registry)?)
    };
    let original = device.read_rect(rect)?;
    let mut painted = original.clone();
    space
        .composite_op(blend.mode)
        .composite(source.data(), painted.data_mut(), blend.opacity, None);

    if guard.alpha_locked || guard.protection.is_some() {
        let alpha = space.alpha_index();
        let size = space.pixel_size();
        for (idx, (pixel, before)) in painted
            .data_mut()
            .chunks_exact_mut(size)
            .zip(original.data().chunks_exact(size))
            .enumerate()
        {
            if guard.alpha_locked {
                pixel[alpha] = before[alpha];
            }
            let protected = guard
                .protection
                .and_then(|coverage| coverage.get(idx).copied())
                .unwrap_or(0);
            if protected != 0 {
                for (value, before) in pixel.iter_mut().zip(before) {
                    *value = math::lerp(*value, *before, protected);
                }
            }
        }
    }
    device.write_rect(&painted)?;
    Ok(rect)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{paint, PaintGuard};
    use crate::blend::{Blend, BlendMode};
    use crate::colorspace::{builtin, global};
    use crate::device::{PaintDevice, PixelBuffer};
    use crate::util::Rect;

    fn rgba_device(fill: Option<[u8; 4]>) -> PaintDevice {
        let mut device = PaintDevice::new(Arc::new(builtin::rgba8()));
        if let Some(fill) = fill {
            device.fill(Rect::new(0, 0, 2, 1), &fill).unwrap();
        }
        device
    }
    fn blue() -> PixelBuffer {
        PixelBuffer::filled(
            Rect::new(0, 0, 2, 1),
            Arc::new(builtin::rgba8()),
            &[0, 0, 255, 255],
        )
        .unwrap()
    }

    #[test]
    fn normal_onto_transparent() {
        let mut device = rgba_device(None);
        let normal = Blend::new(BlendMode::Normal, 255);
        let rect = paint(&mut device, &blue(), normal, PaintGuard::default(), global()).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 2, 1));
        assert_eq!(device.pixel(1, 0).as_slice(), &[0, 0, 255, 255]);
        assert_eq!(device.pixel(2, 0).as_slice(), &[0, 0, 0, 0]);
    }
    #[test]
    fn alpha_lock_keeps_coverage() {
        let mut device = rgba_device(Some([255, 0, 0, 128]));
        let guard = PaintGuard {
            alpha_locked: true,
            protection: None,
        };
        paint(&mut device, &blue(), Blend::new(BlendMode::Normal, 255), guard, global()).unwrap();
        assert_eq!(device.pixel(0, 0).as_slice(), &[0, 0, 255, 128]);
    }
    #[test]
    fn protected_pixels_untouched() {
        let mut device = rgba_device(Some([255, 0, 0, 255]));
        let guard = PaintGuard {
            alpha_locked: false,
            protection: Some(&[255, 0]),
        };
        paint(&mut device, &blue(), Blend::new(BlendMode::Normal, 255), guard, global()).unwrap();
        assert_eq!(device.pixel(0, 0).as_slice(), &[255, 0, 0, 255]);
        assert_eq!(device.pixel(1, 0).as_slice(), &[0, 0, 255, 255]);
    }
    #[test]
    fn source_is_converted() {
        let mut device = rgba_device(None);
        let gray = PixelBuffer::filled(
            Rect::new(0, 0, 1, 1),
            Arc::new(builtin::graya8()),
            &[200, 255],
        )
        .unwrap();
        paint(&mut device, &gray, Blend::new(BlendMode::Normal, 255), PaintGuard::default(), global())
            .unwrap();
        assert_eq!(device.pixel(0, 0).as_slice(), &[200, 200, 200, 255]);
    }
}
