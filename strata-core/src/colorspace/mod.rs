//! # Color spaces
//!
//! A [`ColorSpace`] describes the channel layout of a pixel and owns the compositing
//! operators for it. All channels are 8-bit, and every space has exactly one alpha channel
//! (mask devices use [`builtin::A8`], which is *only* alpha).
//!
//! The canonical interchange representation is straight-alpha RGBA8. Spaces which can
//! convert to and from it can be converted into each other, see [`registry::Registry::conversion`].

pub mod builtin;
pub mod math;
pub mod registry;

pub use registry::{global, Conversion, ConversionError, Registry};

use crate::blend::BlendMode;
use math::{mul, screen, OPAQUE};
use smallvec::SmallVec;

/// Converts exactly one pixel from one layout to another.
pub type PixelConversion = fn(src: &[u8], dst: &mut [u8]);

/// Widest pixel, in channels, a color space may have.
pub const MAX_CHANNELS: usize = 8;
/// An owned pixel value, sized for every layout the builtin spaces use.
pub type Pixel = SmallVec<[u8; MAX_CHANNELS]>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Color,
    Alpha,
}
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: &'static str,
    pub kind: ChannelKind,
}
impl ChannelInfo {
    #[must_use]
    pub const fn color(name: &'static str) -> Self {
        Self {
            name,
            kind: ChannelKind::Color,
        }
    }
    #[must_use]
    pub const fn alpha() -> Self {
        Self {
            name: "Alpha",
            kind: ChannelKind::Alpha,
        }
    }
}

/// How color channel values relate to light.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum ColorModel {
    /// Higher values are brighter (RGB, gray).
    Additive,
    /// Higher values are more ink (CMYK). Blend functions see inverted values.
    Subtractive,
    /// No color channels.
    AlphaOnly,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorSpaceError {
    #[error("color space {0} has no alpha channel")]
    NoAlpha(String),
    #[error("color space {0} has more than one alpha channel")]
    ManyAlpha(String),
    #[error("color space {0} has too many channels")]
    TooWide(String),
}

pub struct ColorSpace {
    id: String,
    name: String,
    model: ColorModel,
    channels: SmallVec<[ChannelInfo; 5]>,
    alpha: usize,
    to_interchange: Option<PixelConversion>,
    from_interchange: Option<PixelConversion>,
}
impl ColorSpace {
    /// Describe a new 8-bit color space. Exactly one channel must be [`ChannelKind::Alpha`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        model: ColorModel,
        channels: impl IntoIterator<Item = ChannelInfo>,
    ) -> Result<Self, ColorSpaceError> {
        let id = id.into();
        let channels: SmallVec<[ChannelInfo; 5]> = channels.into_iter().collect();
        if channels.len() > MAX_CHANNELS {
            return Err(ColorSpaceError::TooWide(id));
        }
        let mut alphas = channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.kind == ChannelKind::Alpha)
            .map(|(idx, _)| idx);
        let alpha = alphas.next().ok_or_else(|| ColorSpaceError::NoAlpha(id.clone()))?;
        if alphas.next().is_some() {
            return Err(ColorSpaceError::ManyAlpha(id));
        }
        Ok(Self {
            id,
            name: name.into(),
            model,
            channels,
            alpha,
            to_interchange: None,
            from_interchange: None,
        })
    }
    /// For layouts known to be valid at compile time.
    pub(crate) fn new_unchecked(
        id: &str,
        name: &str,
        model: ColorModel,
        channels: &[ChannelInfo],
        alpha: usize,
    ) -> Self {
        debug_assert_eq!(channels.get(alpha).map(|c| c.kind), Some(ChannelKind::Alpha));
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            model,
            channels: channels.iter().cloned().collect(),
            alpha,
            to_interchange: None,
            from_interchange: None,
        }
    }
    /// Attach conversions to and from straight-alpha RGBA8.
    #[must_use]
    pub fn with_interchange(mut self, to: PixelConversion, from: PixelConversion) -> Self {
        self.to_interchange = Some(to);
        self.from_interchange = Some(from);
        self
    }
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn model(&self) -> ColorModel {
        self.model
    }
    #[must_use]
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }
    /// Bytes per pixel.
    #[must_use]
    pub fn pixel_size(&self) -> usize {
        self.channels.len()
    }
    #[must_use]
    pub fn alpha_index(&self) -> usize {
        self.alpha
    }
    /// Indices of every non-alpha channel.
    pub fn color_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let alpha = self.alpha;
        (0..self.channels.len()).filter(move |&idx| idx != alpha)
    }
    #[must_use]
    pub fn to_interchange(&self) -> Option<PixelConversion> {
        self.to_interchange
    }
    #[must_use]
    pub fn from_interchange(&self) -> Option<PixelConversion> {
        self.from_interchange
    }
    /// All zeroes, the default pixel of new devices.
    #[must_use]
    pub fn transparent_pixel(&self) -> Pixel {
        smallvec::smallvec![0; self.pixel_size()]
    }
    /// Get the compositing operator implementing `mode` in this space.
    #[must_use]
    pub fn composite_op(&self, mode: BlendMode) -> CompositeOp {
        CompositeOp {
            mode,
            subtractive: self.model == ColorModel::Subtractive,
            pixel_size: self.pixel_size(),
            alpha: self.alpha,
        }
    }
    /// The full operator table of this space.
    pub fn composite_ops(&self) -> impl Iterator<Item = CompositeOp> + '_ {
        <BlendMode as strum::IntoEnumIterator>::iter().map(|mode| self.composite_op(mode))
    }
}
impl PartialEq for ColorSpace {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ColorSpace {}
impl std::fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorSpace")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("channels", &self.channels.len())
            .field("interchange", &self.to_interchange.is_some())
            .finish_non_exhaustive()
    }
}

/// A blend mode bound to a pixel layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompositeOp {
    mode: BlendMode,
    subtractive: bool,
    pixel_size: usize,
    alpha: usize,
}
impl CompositeOp {
    #[must_use]
    pub fn mode(&self) -> BlendMode {
        self.mode
    }
    /// Composite a packed run of `src` pixels onto `dst`, pixel for pixel.
    ///
    /// The source alpha is scaled by `opacity` and, if given, by the per-pixel `mask` coverage.
    /// Both runs must be in the color space this op was created from.
    pub fn composite(&self, src: &[u8], dst: &mut [u8], opacity: u8, mask: Option<&[u8]>) {
        debug_assert_eq!(src.len(), dst.len(), "mismatched run lengths");
        for (idx, (src, dst)) in src
            .chunks_exact(self.pixel_size)
            .zip(dst.chunks_exact_mut(self.pixel_size))
            .enumerate()
        {
            let mut sa = mul(src[self.alpha], opacity);
            if let Some(mask) = mask {
                sa = mul(sa, mask.get(idx).copied().unwrap_or(OPAQUE));
            }
            self.composite_pixel(src, dst, sa);
        }
    }
    fn composite_pixel(&self, src: &[u8], dst: &mut [u8], sa: u8) {
        let da = dst[self.alpha];
        if self.mode == BlendMode::Erase {
            dst[self.alpha] = mul(da, OPAQUE - sa);
            return;
        }
        let na = screen(sa, da);
        if na == 0 {
            // Nothing visible either way, carry the source color so that a layer
            // at zero opacity still reads back its own color.
            dst.copy_from_slice(src);
            dst[self.alpha] = 0;
            return;
        }
        for channel in (0..self.pixel_size).filter(|&c| c != self.alpha) {
            let (s, d) = (src[channel], dst[channel]);
            let blended = if self.subtractive {
                OPAQUE - self.mode.blend_channel(OPAQUE - s, OPAQUE - d)
            } else {
                self.mode.blend_channel(s, d)
            };
            dst[channel] = math::composite_channel(blended, s, d, sa, da, na);
        }
        dst[self.alpha] = na;
    }
}

#[cfg(test)]
mod test {
    use super::{
        builtin, BlendMode, ChannelInfo, ColorModel, ColorSpace, ColorSpaceError, MAX_CHANNELS,
    };

    #[test]
    fn requires_single_alpha() {
        let none = ColorSpace::new(
            "X",
            "x",
            ColorModel::Additive,
            [ChannelInfo::color("Gray")],
        );
        assert_eq!(none.err(), Some(ColorSpaceError::NoAlpha("X".into())));
        let two = ColorSpace::new(
            "Y",
            "y",
            ColorModel::Additive,
            [ChannelInfo::alpha(), ChannelInfo::alpha()],
        );
        assert_eq!(two.err(), Some(ColorSpaceError::ManyAlpha("Y".into())));
    }
    #[test]
    fn width_limit() {
        let layout = |colors: usize| {
            std::iter::repeat(ChannelInfo::color("Ink"))
                .take(colors)
                .chain([ChannelInfo::alpha()])
        };
        let widest = ColorSpace::new("W", "w", ColorModel::Subtractive, layout(MAX_CHANNELS - 1));
        assert_eq!(widest.map(|space| space.pixel_size()).ok(), Some(MAX_CHANNELS));
        let too_wide = ColorSpace::new("Z", "z", ColorModel::Subtractive, layout(MAX_CHANNELS));
        assert_eq!(too_wide.err(), Some(ColorSpaceError::TooWide("Z".into())));
    }
    #[test]
    fn opacity_over_transparent() {
        let rgba = builtin::rgba8();
        let op = rgba.composite_op(BlendMode::Normal);
        for opacity in 0..=255u8 {
            let mut dst = [0u8; 4];
            op.composite(&[10, 200, 30, 255], &mut dst, opacity, None);
            assert_eq!(dst, [10, 200, 30, opacity], "opacity {opacity}");
        }
    }
    #[test]
    fn half_blue_over_red() {
        let rgba = builtin::rgba8();
        let mut dst = [255, 0, 0, 255];
        rgba.composite_op(BlendMode::Normal)
            .composite(&[0, 0, 255, 255], &mut dst, 128, None);
        assert_eq!(dst, [127, 0, 128, 255]);
    }
    #[test]
    fn erase_only_touches_alpha() {
        let rgba = builtin::rgba8();
        let mut dst = [40, 50, 60, 200];
        rgba.composite_op(BlendMode::Erase)
            .composite(&[0, 0, 0, 255], &mut dst, 255, Some(&[128]));
        assert_eq!(dst, [40, 50, 60, 100]);
    }
    #[test]
    fn subtractive_multiply_adds_ink() {
        // Multiplying two half-inked cyan layers in CMYK should give *more* cyan, like RGB darkening.
        let cmyk = builtin::cmyka8();
        let mut dst = [128, 0, 0, 0, 255];
        cmyk.composite_op(BlendMode::Multiply)
            .composite(&[128, 0, 0, 0, 255], &mut dst, 255, None);
        assert!(dst[0] > 128, "got {dst:?}");
        assert_eq!(&dst[1..], &[0, 0, 0, 255]);
    }
    #[test]
    fn operator_table_is_complete() {
        let rgba = builtin::rgba8();
        let modes: Vec<_> = rgba.composite_ops().map(|op| op.mode()).collect();
        assert!(modes.contains(&BlendMode::Normal));
        assert!(modes.contains(&BlendMode::Erase));
        assert_eq!(modes.len(), <BlendMode as strum::IntoEnumIterator>::iter().count());
    }
}
