//! The color spaces every [`Registry`](super::Registry) starts with.

use super::math::{div, mul, OPAQUE};
use super::{ChannelInfo, ColorModel, ColorSpace};

pub const RGBA8: &str = "RGBA8";
pub const CMYKA8: &str = "CMYKA8";
pub const GRAYA8: &str = "GRAYA8";
pub const A8: &str = "A8";

/// Every builtin space, in registration order.
#[must_use]
pub fn all() -> [ColorSpace; 4] {
    [rgba8(), cmyka8(), graya8(), a8()]
}

#[must_use]
pub fn rgba8() -> ColorSpace {
    ColorSpace::new_unchecked(
        RGBA8,
        "RGB/Alpha (8-bit)",
        ColorModel::Additive,
        &[
            ChannelInfo::color("Red"),
            ChannelInfo::color("Green"),
            ChannelInfo::color("Blue"),
            ChannelInfo::alpha(),
        ],
        3,
    )
    .with_interchange(copy_pixel, copy_pixel)
}
fn copy_pixel(src: &[u8], dst: &mut [u8]) {
    dst[..4].copy_from_slice(&src[..4]);
}

/// Naive device CMYK. No profile, black is extracted as the complement of the brightest channel.
#[must_use]
pub fn cmyka8() -> ColorSpace {
    ColorSpace::new_unchecked(
        CMYKA8,
        "CMYK/Alpha (8-bit)",
        ColorModel::Subtractive,
        &[
            ChannelInfo::color("Cyan"),
            ChannelInfo::color("Magenta"),
            ChannelInfo::color("Yellow"),
            ChannelInfo::color("Black"),
            ChannelInfo::alpha(),
        ],
        4,
    )
    .with_interchange(cmyk_to_rgba, rgba_to_cmyk)
}
fn cmyk_to_rgba(src: &[u8], dst: &mut [u8]) {
    let white = OPAQUE - src[3];
    for (dst, ink) in dst[..3].iter_mut().zip(&src[..3]) {
        *dst = mul(OPAQUE - ink, white);
    }
    dst[3] = src[4];
}
fn rgba_to_cmyk(src: &[u8], dst: &mut [u8]) {
    let max = src[0].max(src[1]).max(src[2]);
    if max == 0 {
        dst[..4].copy_from_slice(&[0, 0, 0, OPAQUE]);
    } else {
        for (dst, light) in dst[..3].iter_mut().zip(&src[..3]) {
            *dst = div(max - light, max);
        }
        dst[3] = OPAQUE - max;
    }
    dst[4] = src[3];
}

#[must_use]
pub fn graya8() -> ColorSpace {
    ColorSpace::new_unchecked(
        GRAYA8,
        "Gray/Alpha (8-bit)",
        ColorModel::Additive,
        &[ChannelInfo::color("Gray"), ChannelInfo::alpha()],
        1,
    )
    .with_interchange(gray_to_rgba, rgba_to_gray)
}
fn gray_to_rgba(src: &[u8], dst: &mut [u8]) {
    dst[..3].fill(src[0]);
    dst[3] = src[1];
}
fn rgba_to_gray(src: &[u8], dst: &mut [u8]) {
    dst[0] = luma(src[0], src[1], src[2]);
    dst[1] = src[3];
}
/// Rec. 601 luma, rounded.
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    // Weights sum to 1000, so the result never exceeds 255.
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000) as u8
}

/// Coverage only. Used by every mask device.
#[must_use]
pub fn a8() -> ColorSpace {
    ColorSpace::new_unchecked(A8, "Alpha (8-bit)", ColorModel::AlphaOnly, &[ChannelInfo::alpha()], 0)
}

#[cfg(test)]
mod test {
    use super::*;

    fn through(space: &ColorSpace, rgba: [u8; 4]) -> [u8; 4] {
        let mut native = vec![0; space.pixel_size()];
        let mut back = [0; 4];
        (space.from_interchange().unwrap())(&rgba, &mut native);
        (space.to_interchange().unwrap())(&native, &mut back);
        back
    }
    #[test]
    fn layouts() {
        assert_eq!(rgba8().pixel_size(), 4);
        assert_eq!(cmyka8().alpha_index(), 4);
        assert_eq!(graya8().color_indices().collect::<Vec<_>>(), vec![0]);
        let a8 = a8();
        assert_eq!(a8.pixel_size(), 1);
        assert!(a8.to_interchange().is_none());
        assert_eq!(a8.color_indices().count(), 0);
    }
    #[test]
    fn cmyk_primaries() {
        let cmyk = cmyka8();
        let mut native = [0; 5];
        (cmyk.from_interchange().unwrap())(&[255, 0, 0, 200], &mut native);
        assert_eq!(native, [0, 255, 255, 0, 200]);
        (cmyk.from_interchange().unwrap())(&[0, 0, 0, 255], &mut native);
        assert_eq!(native, [0, 0, 0, 255, 255]);
        (cmyk.from_interchange().unwrap())(&[255, 255, 255, 255], &mut native);
        assert_eq!(native, [0, 0, 0, 0, 255]);
    }
    #[test]
    fn cmyk_round_trip_is_close() {
        let cmyk = cmyka8();
        for rgba in [[12, 200, 99, 255], [255, 128, 0, 10], [40, 40, 40, 128]] {
            let back = through(&cmyk, rgba);
            for (a, b) in rgba.iter().zip(&back) {
                assert!(a.abs_diff(*b) <= 2, "{rgba:?} became {back:?}");
            }
        }
    }
    #[test]
    fn gray_is_lossy_but_stable() {
        let gray = graya8();
        assert_eq!(through(&gray, [255, 0, 0, 255]), [76, 76, 76, 255]);
        assert_eq!(through(&gray, [90, 90, 90, 7]), [90, 90, 90, 7]);
    }
}
