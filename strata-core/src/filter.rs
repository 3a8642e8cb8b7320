//! Per-pixel filters run by effect masks. Filters see straight RGBA8 and never touch alpha.

use crate::colorspace::builtin::luma;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EffectFilter {
    Invert,
    /// Add to every color channel, saturating.
    Brightness(i16),
    /// Replace color with its luma.
    Desaturate,
    /// White where luma is at least the level, black elsewhere.
    Threshold(u8),
    /// Quantize each channel to this many levels, at least two.
    Posterize(u8),
}
impl EffectFilter {
    pub fn apply(&self, pixels: &mut [[u8; 4]]) {
        for pixel in pixels {
            self.apply_pixel(pixel);
        }
    }
    pub fn apply_pixel(&self, pixel: &mut [u8; 4]) {
        let [r, g, b, _] = *pixel;
        let color = &mut pixel[..3];
        match *self {
            Self::Invert => color.iter_mut().for_each(|c| *c = u8::MAX - *c),
            Self::Brightness(delta) => color.iter_mut().for_each(|c| {
                *c = (i16::from(*c) + delta).clamp(0, 255) as u8;
            }),
            Self::Desaturate => color.fill(luma(r, g, b)),
            Self::Threshold(level) => {
                color.fill(if luma(r, g, b) >= level { u8::MAX } else { 0 });
            }
            Self::Posterize(levels) => {
                let steps = u32::from(levels.max(2) - 1);
                color.iter_mut().for_each(|c| {
                    let bucket = (u32::from(*c) * steps + 127) / 255;
                    *c = ((bucket * 255 + steps / 2) / steps) as u8;
                });
            }
        }
    }
}
