//! # Paint devices
//!
//! A [`PaintDevice`] is an unbounded, sparse raster. Pixels are stored in square tiles of
//! [`TILE_SIZE`], and only tiles holding something other than the default pixel are kept.
//! Tiles are reference counted and copied on write, so a [`DeviceSnapshot`] is cheap and
//! stays valid while the device keeps changing.

mod buffer;

pub use buffer::PixelBuffer;

use std::sync::Arc;

use crate::colorspace::{ColorSpace, ConversionError, Pixel, Registry};
use crate::util::Rect;

/// Width and height of a tile, in pixels.
pub const TILE_SIZE: u32 = 64;
const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

type TileKey = (i32, i32);

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("expected pixels in {expected}, found {found}")]
    ColorSpaceMismatch { expected: String, found: String },
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
    #[error("expected {expected} bytes, found {found}")]
    BadLength { expected: usize, found: usize },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

fn check_space(expected: &ColorSpace, found: &ColorSpace) -> Result<(), DeviceError> {
    if expected == found {
        Ok(())
    } else {
        Err(DeviceError::ColorSpaceMismatch {
            expected: expected.id().to_owned(),
            found: found.id().to_owned(),
        })
    }
}

fn tile_of(x: i32, y: i32) -> TileKey {
    let size = TILE_SIZE as i32;
    (x.div_euclid(size), y.div_euclid(size))
}
fn tile_rect((tx, ty): TileKey) -> Rect {
    let size = TILE_SIZE as i32;
    Rect::new(tx * size, ty * size, TILE_SIZE, TILE_SIZE)
}
/// Keys of every tile overlapping `rect`, row major.
fn tiles_touching(rect: Rect) -> impl Iterator<Item = TileKey> {
    let (range_x, range_y) = if rect.is_empty() {
        (1..=0, 1..=0)
    } else {
        let (left, top) = tile_of(rect.left(), rect.top());
        let (right, bottom) = tile_of(rect.right() - 1, rect.bottom() - 1);
        (left..=right, top..=bottom)
    };
    range_y.flat_map(move |ty| range_x.clone().map(move |tx| (tx, ty)))
}

#[derive(Clone)]
pub struct PaintDevice {
    color_space: Arc<ColorSpace>,
    default_pixel: Pixel,
    tiles: hashbrown::HashMap<TileKey, Arc<Vec<u8>>>,
}
impl PaintDevice {
    /// An empty device, every pixel transparent.
    #[must_use]
    pub fn new(color_space: Arc<ColorSpace>) -> Self {
        Self {
            default_pixel: color_space.transparent_pixel(),
            color_space,
            tiles: hashbrown::HashMap::new(),
        }
    }
    /// An empty device reading as `default_pixel` everywhere.
    pub fn with_default(
        color_space: Arc<ColorSpace>,
        default_pixel: &[u8],
    ) -> Result<Self, DeviceError> {
        if default_pixel.len() != color_space.pixel_size() {
            return Err(DeviceError::BadLength {
                expected: color_space.pixel_size(),
                found: default_pixel.len(),
            });
        }
        Ok(Self {
            default_pixel: default_pixel.into(),
            color_space,
            tiles: hashbrown::HashMap::new(),
        })
    }
    /// As [`Self::with_default`], for pixels already known to fit.
    pub(crate) fn uniform(color_space: Arc<ColorSpace>, default_pixel: Pixel) -> Self {
        debug_assert_eq!(default_pixel.len(), color_space.pixel_size());
        Self {
            default_pixel,
            color_space,
            tiles: hashbrown::HashMap::new(),
        }
    }
    #[must_use]
    pub fn color_space(&self) -> &Arc<ColorSpace> {
        &self.color_space
    }
    #[must_use]
    pub fn default_pixel(&self) -> &[u8] {
        &self.default_pixel
    }
    #[must_use]
    pub fn pixel_size(&self) -> usize {
        self.color_space.pixel_size()
    }
    /// Number of allocated tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
    /// Loose bounds, the union of every stored tile. Pixels outside always read as the default.
    #[must_use]
    pub fn extent(&self) -> Rect {
        self.tiles
            .keys()
            .fold(Rect::EMPTY, |acc, key| acc.union(&tile_rect(*key)))
    }
    /// Tight bounds of every pixel that differs from the default.
    #[must_use]
    pub fn exact_bounds(&self) -> Rect {
        let size = self.pixel_size();
        let mut bounds = Rect::EMPTY;
        for (key, tile) in &self.tiles {
            let origin = tile_rect(*key);
            for (idx, pixel) in tile.chunks_exact(size).enumerate() {
                if pixel != &self.default_pixel[..] {
                    let x = origin.left() + (idx % TILE_SIZE as usize) as i32;
                    let y = origin.top() + (idx / TILE_SIZE as usize) as i32;
                    bounds = bounds.union(&Rect::new(x, y, 1, 1));
                }
            }
        }
        bounds
    }
    /// Read a single pixel.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        let key = tile_of(x, y);
        match self.tiles.get(&key) {
            None => self.default_pixel.clone(),
            Some(tile) => {
                let origin = tile_rect(key);
                let idx = (y - origin.top()) as usize * TILE_SIZE as usize
                    + (x - origin.left()) as usize;
                let size = self.pixel_size();
                tile[idx * size..(idx + 1) * size].into()
            }
        }
    }
    /// Copy out the pixels of `rect`. Areas without tiles read as the default pixel.
    pub fn read_rect(&self, rect: Rect) -> Result<PixelBuffer, DeviceError> {
        let mut out = PixelBuffer::filled(rect, self.color_space.clone(), &self.default_pixel)?;
        let size = self.pixel_size();
        for key in tiles_touching(rect) {
            let Some(tile) = self.tiles.get(&key) else {
                continue;
            };
            let origin = tile_rect(key);
            let overlap = origin.intersection(&rect);
            let len = overlap.width() as usize * size;
            for y in overlap.top()..overlap.bottom() {
                let start = tile_offset(origin, overlap.left(), y) * size;
                out.span_mut(y, overlap.left(), overlap.right())
                    .copy_from_slice(&tile[start..start + len]);
            }
        }
        Ok(out)
    }
    /// Store the pixels of `buffer` at its rect.
    pub fn write_rect(&mut self, buffer: &PixelBuffer) -> Result<(), DeviceError> {
        check_space(&self.color_space, buffer.color_space())?;
        let rect = buffer.rect();
        let size = self.pixel_size();
        for key in tiles_touching(rect) {
            let origin = tile_rect(key);
            let overlap = origin.intersection(&rect);
            let len = overlap.width() as usize * size;
            let tile = self
                .tiles
                .entry(key)
                .or_insert_with(|| Arc::new(self.default_pixel.repeat(TILE_PIXELS)));
            let tile_data = Arc::make_mut(tile);
            for y in overlap.top()..overlap.bottom() {
                let start = tile_offset(origin, overlap.left(), y) * size;
                tile_data[start..start + len]
                    .copy_from_slice(buffer.span(y, overlap.left(), overlap.right()));
            }
            if is_uniform(tile_data, &self.default_pixel) {
                self.tiles.remove(&key);
            }
        }
        Ok(())
    }
    /// Set every pixel of `rect` to `pixel`.
    pub fn fill(&mut self, rect: Rect, pixel: &[u8]) -> Result<(), DeviceError> {
        if pixel.len() != self.pixel_size() {
            return Err(DeviceError::BadLength {
                expected: self.pixel_size(),
                found: pixel.len(),
            });
        }
        let size = self.pixel_size();
        let is_default = pixel == &self.default_pixel[..];
        for key in tiles_touching(rect) {
            let origin = tile_rect(key);
            let overlap = origin.intersection(&rect);
            if overlap == origin {
                // Whole tile, skip the per-row work.
                if is_default {
                    self.tiles.remove(&key);
                } else {
                    self.tiles.insert(key, Arc::new(pixel.repeat(TILE_PIXELS)));
                }
                continue;
            }
            if is_default && !self.tiles.contains_key(&key) {
                continue;
            }
            let tile = self
                .tiles
                .entry(key)
                .or_insert_with(|| Arc::new(self.default_pixel.repeat(TILE_PIXELS)));
            let tile_data = Arc::make_mut(tile);
            for y in overlap.top()..overlap.bottom() {
                let start = tile_offset(origin, overlap.left(), y) * size;
                let row = &mut tile_data[start..start + overlap.width() as usize * size];
                for dst in row.chunks_exact_mut(size) {
                    dst.copy_from_slice(pixel);
                }
            }
            if is_uniform(tile_data, &self.default_pixel) {
                self.tiles.remove(&key);
            }
        }
        Ok(())
    }
    /// Reset `rect` to the default pixel.
    pub fn clear(&mut self, rect: Rect) {
        let default = self.default_pixel.clone();
        // Length always matches.
        let _ = self.fill(rect, &default);
    }
    /// Drop every tile.
    pub fn clear_all(&mut self) {
        self.tiles.clear();
    }
    /// Convert all content, including the default pixel, into `target`.
    ///
    /// On error the device is left unchanged.
    pub fn convert_to(
        &mut self,
        target: Arc<ColorSpace>,
        registry: &Registry,
    ) -> Result<(), ConversionError> {
        let conversion = registry.conversion(&self.color_space, &target)?;
        let (from_size, to_size) = (self.pixel_size(), target.pixel_size());
        let mut default_pixel = target.transparent_pixel();
        conversion.convert(&self.default_pixel, from_size, &mut default_pixel, to_size);
        let tiles = self
            .tiles
            .iter()
            .filter_map(|(key, tile)| {
                let mut converted = vec![0; TILE_PIXELS * to_size];
                conversion.convert(tile, from_size, &mut converted, to_size);
                // Tiles may become default through lossy conversion.
                (!is_uniform(&converted, &default_pixel)).then(|| (*key, Arc::new(converted)))
            })
            .collect();
        log::trace!(
            "converted device {} -> {}",
            self.color_space.id(),
            target.id()
        );
        self.tiles = tiles;
        self.default_pixel = default_pixel;
        self.color_space = target;
        Ok(())
    }
    /// Capture the current content. Costs one reference count per tile.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot(self.clone())
    }
    /// Replace all content with a snapshot's.
    pub fn restore(&mut self, snapshot: &DeviceSnapshot) {
        *self = snapshot.0.clone();
    }
}
impl std::fmt::Debug for PaintDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaintDevice")
            .field("color_space", &self.color_space.id())
            .field("tiles", &self.tiles.len())
            .field("extent", &self.extent())
            .finish()
    }
}

/// An immutable copy of a device's content.
#[derive(Clone, Debug)]
pub struct DeviceSnapshot(PaintDevice);
impl DeviceSnapshot {
    /// Read-only access to the captured content.
    #[must_use]
    pub fn device(&self) -> &PaintDevice {
        &self.0
    }
    /// Do two snapshots share every tile? Cheaper than comparing pixels, may report false
    /// for equal content.
    #[must_use]
    pub fn shares_content(&self, other: &Self) -> bool {
        let (a, b) = (&self.0, &other.0);
        a.color_space == b.color_space
            && a.default_pixel == b.default_pixel
            && a.tiles.len() == b.tiles.len()
            && a.tiles
                .iter()
                .all(|(key, tile)| b.tiles.get(key).is_some_and(|other| Arc::ptr_eq(tile, other)))
    }
}

fn tile_offset(origin: Rect, x: i32, y: i32) -> usize {
    y.abs_diff(origin.top()) as usize * TILE_SIZE as usize + x.abs_diff(origin.left()) as usize
}
fn is_uniform(data: &[u8], pixel: &[u8]) -> bool {
    data.chunks_exact(pixel.len()).all(|p| p == pixel)
}
