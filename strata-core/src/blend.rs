/// Per-channel blend function used when merging a layer onto its background.
#[derive(
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumString,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Add,
    Subtract,
    Difference,
    /// Removes destination coverage by the source alpha, color is untouched.
    Erase,
}
impl BlendMode {
    /// The separable blend function `B(src, dst)` on additive 8-bit channel values.
    ///
    /// Subtractive color models invert their channels around this, see [`crate::colorspace::CompositeOp`].
    #[must_use]
    pub fn blend_channel(self, src: u8, dst: u8) -> u8 {
        use crate::colorspace::math::{mul, screen};
        match self {
            // Erase never reaches the color path, treat as normal.
            Self::Normal | Self::Erase => src,
            Self::Multiply => mul(src, dst),
            Self::Screen => screen(src, dst),
            // Hard light with the layers swapped.
            Self::Overlay => {
                if dst < 128 {
                    mul(src, dst.saturating_mul(2))
                } else {
                    screen(src, dst - (255 - dst))
                }
            }
            Self::Darken => src.min(dst),
            Self::Lighten => src.max(dst),
            Self::Add => src.saturating_add(dst),
            Self::Subtract => dst.saturating_sub(src),
            Self::Difference => src.abs_diff(dst),
        }
    }
}

/// Blend settings for a node: a mode and a whole-layer opacity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Blend {
    pub mode: BlendMode,
    /// 0 is fully transparent, 255 is opaque.
    pub opacity: u8,
}
impl Default for Blend {
    fn default() -> Self {
        Self {
            mode: BlendMode::default(),
            opacity: u8::MAX,
        }
    }
}
impl Blend {
    #[must_use]
    pub fn new(mode: BlendMode, opacity: u8) -> Self {
        Self { mode, opacity }
    }
}

#[cfg(test)]
mod test {
    use super::BlendMode;
    #[test]
    fn parse_names() {
        assert_eq!("multiply".parse::<BlendMode>().ok(), Some(BlendMode::Multiply));
        assert_eq!("Screen".parse::<BlendMode>().ok(), Some(BlendMode::Screen));
        assert!("nonsense".parse::<BlendMode>().is_err());
        assert_eq!(BlendMode::Difference.as_ref(), "difference");
    }
    #[test]
    fn identities() {
        // White is the multiply identity, black the screen identity.
        for v in [0u8, 1, 77, 128, 254, 255] {
            assert_eq!(BlendMode::Multiply.blend_channel(v, 255), v);
            assert_eq!(BlendMode::Screen.blend_channel(v, 0), v);
            assert_eq!(BlendMode::Difference.blend_channel(v, v), 0);
        }
    }
    #[test]
    fn screen_never_darkens() {
        for s in (0..=255u8).step_by(5) {
            for d in (0..=255u8).step_by(5) {
                assert!(BlendMode::Screen.blend_channel(s, d) >= s.max(d));
            }
        }
    }
}
