//! Lookup of color spaces by id, and conversion paths between them.

use std::sync::Arc;

use super::{builtin, ColorSpace, PixelConversion};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("no conversion path from {from} to {to}")]
    NoPath { from: String, to: String },
    #[error("unknown color space {0}")]
    UnknownSpace(String),
    #[error("color space {0} is already registered")]
    Duplicate(String),
}

/// A resolved way to turn pixels of one space into another.
#[derive(Clone)]
pub enum Conversion {
    /// Same space, copy.
    Identity,
    /// A conversion registered for exactly this pair.
    Direct(PixelConversion),
    /// Through straight RGBA8.
    Interchange {
        to: PixelConversion,
        from: PixelConversion,
    },
}
impl Conversion {
    /// Convert a packed run of pixels. `dst` must hold as many pixels as `src`.
    pub fn convert(&self, src: &[u8], src_size: usize, dst: &mut [u8], dst_size: usize) {
        match self {
            Self::Identity => dst.copy_from_slice(src),
            Self::Direct(convert) => {
                for (src, dst) in src.chunks_exact(src_size).zip(dst.chunks_exact_mut(dst_size)) {
                    convert(src, dst);
                }
            }
            Self::Interchange { to, from } => {
                let mut rgba = [0u8; 4];
                for (src, dst) in src.chunks_exact(src_size).zip(dst.chunks_exact_mut(dst_size)) {
                    to(src, &mut rgba);
                    from(&rgba, dst);
                }
            }
        }
    }
}
impl std::fmt::Debug for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Identity => "Identity",
            Self::Direct(_) => "Direct",
            Self::Interchange { .. } => "Interchange",
        })
    }
}

pub struct Registry {
    spaces: parking_lot::RwLock<hashbrown::HashMap<String, Arc<ColorSpace>>>,
    conversions: parking_lot::RwLock<hashbrown::HashMap<(String, String), PixelConversion>>,
}
impl Default for Registry {
    /// A registry holding the builtin spaces.
    fn default() -> Self {
        let spaces = builtin::all()
            .into_iter()
            .map(|space| (space.id().to_owned(), Arc::new(space)))
            .collect();
        Self {
            spaces: parking_lot::RwLock::new(spaces),
            conversions: parking_lot::RwLock::default(),
        }
    }
}
impl Registry {
    /// Add a color space. Ids are unique, an existing space is never replaced.
    pub fn register(&self, space: ColorSpace) -> Result<Arc<ColorSpace>, ConversionError> {
        let mut spaces = self.spaces.write();
        match spaces.entry(space.id().to_owned()) {
            hashbrown::hash_map::Entry::Occupied(o) => {
                Err(ConversionError::Duplicate(o.key().clone()))
            }
            hashbrown::hash_map::Entry::Vacant(v) => {
                log::debug!("registered color space {}", space.id());
                Ok(v.insert(Arc::new(space)).clone())
            }
        }
    }
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ColorSpace>> {
        self.spaces.read().get(id).cloned()
    }
    /// Ids of every registered space, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.spaces.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
    /// Register a direct conversion, preferred over the interchange path. Replaces any previous
    /// conversion for the same pair.
    pub fn register_conversion(
        &self,
        from: &str,
        to: &str,
        convert: PixelConversion,
    ) -> Result<(), ConversionError> {
        for id in [from, to] {
            if self.get(id).is_none() {
                return Err(ConversionError::UnknownSpace(id.to_owned()));
            }
        }
        self.conversions
            .write()
            .insert((from.to_owned(), to.to_owned()), convert);
        Ok(())
    }
    /// Find the best conversion between two spaces.
    pub fn conversion(
        &self,
        from: &ColorSpace,
        to: &ColorSpace,
    ) -> Result<Conversion, ConversionError> {
        if from == to {
            return Ok(Conversion::Identity);
        }
        if let Some(direct) = self
            .conversions
            .read()
            .get(&(from.id().to_owned(), to.id().to_owned()))
        {
            return Ok(Conversion::Direct(*direct));
        }
        match (from.to_interchange(), to.from_interchange()) {
            (Some(to_rgba), Some(from_rgba)) => Ok(Conversion::Interchange {
                to: to_rgba,
                from: from_rgba,
            }),
            _ => Err(ConversionError::NoPath {
                from: from.id().to_owned(),
                to: to.id().to_owned(),
            }),
        }
    }
}

/// The process-wide registry, populated with the builtin spaces on first access.
pub fn global() -> &'static Registry {
    static GLOBAL: std::sync::OnceLock<Registry> = std::sync::OnceLock::new();
    GLOBAL.get_or_init(Registry::default)
}

#[cfg(test)]
mod test {
    use super::{builtin, Conversion, ConversionError, Registry};
    use crate::colorspace::{ChannelInfo, ColorModel, ColorSpace};

    #[test]
    fn builtins_present() {
        let registry = Registry::default();
        assert_eq!(registry.ids(), ["A8", "CMYKA8", "GRAYA8", "RGBA8"]);
        assert!(registry.get("LAB16").is_none());
    }
    #[test]
    fn paths() {
        let registry = Registry::default();
        let rgba = registry.get(builtin::RGBA8).unwrap();
        let cmyk = registry.get(builtin::CMYKA8).unwrap();
        let a8 = registry.get(builtin::A8).unwrap();
        assert!(matches!(registry.conversion(&rgba, &rgba), Ok(Conversion::Identity)));
        assert!(matches!(
            registry.conversion(&cmyk, &rgba),
            Ok(Conversion::Interchange { .. })
        ));
        assert_eq!(
            registry.conversion(&a8, &rgba).err(),
            Some(ConversionError::NoPath {
                from: "A8".into(),
                to: "RGBA8".into()
            })
        );
    }
    #[test]
    fn direct_preferred() {
        fn stamp(_: &[u8], dst: &mut [u8]) {
            dst.fill(7);
        }
        let registry = Registry::default();
        registry
            .register_conversion(builtin::GRAYA8, builtin::RGBA8, stamp)
            .unwrap();
        let gray = registry.get(builtin::GRAYA8).unwrap();
        let rgba = registry.get(builtin::RGBA8).unwrap();
        let conversion = registry.conversion(&gray, &rgba).unwrap();
        let mut out = [0; 8];
        conversion.convert(&[1, 2, 3, 4], 2, &mut out, 4);
        assert_eq!(out, [7; 8]);
    }
    #[test]
    fn register_custom() {
        let registry = Registry::default();
        let space = ColorSpace::new(
            "XA8",
            "Custom",
            ColorModel::Additive,
            [ChannelInfo::color("X"), ChannelInfo::alpha()],
        )
        .unwrap();
        registry.register(space).unwrap();
        let again = ColorSpace::new("XA8", "Again", ColorModel::Additive, [ChannelInfo::alpha()]);
        assert_eq!(
            registry.register(again.unwrap()).err(),
            Some(ConversionError::Duplicate("XA8".into()))
        );
        assert_eq!(
            registry.register_conversion("XA8", "nope", |_, _| ()).err(),
            Some(ConversionError::UnknownSpace("nope".into()))
        );
    }
}
