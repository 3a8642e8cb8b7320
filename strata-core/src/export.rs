//! # Export
//!
//! Export filters turn a block of projection pixels into some external format. They are looked up
//! in an [`ExportFilterRegistry`] by id, MIME type or file extension. A [`FrameExporter`] drives a
//! filter over a sequence of frames, stopping between frames when cancelled.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::device::{DeviceError, PixelBuffer};
use crate::image::ImageError;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{filter} can't export {color_space} pixels")]
    UnsupportedColorSpace { filter: String, color_space: String },
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("an export filter with id {0} is already registered")]
    Duplicate(String),
}

pub trait ExportFilter: Send + Sync {
    /// Unique, stable identifier.
    fn id(&self) -> &str;
    /// Human readable name.
    fn name(&self) -> &str;
    fn mime_types(&self) -> &[&str];
    /// Extensions without the leading dot.
    fn extensions(&self) -> &[&str];
    /// Encode `pixels` into `out`.
    fn export(&self, pixels: &PixelBuffer, out: &mut dyn std::io::Write) -> Result<(), ExportError>;
}

/// Writes pixels exactly as stored, row major, no header.
pub struct RawExportFilter;
impl ExportFilter for RawExportFilter {
    fn id(&self) -> &str {
        "raw"
    }
    fn name(&self) -> &str {
        "Raw pixels"
    }
    fn mime_types(&self) -> &[&str] {
        &["application/octet-stream"]
    }
    fn extensions(&self) -> &[&str] {
        &["raw", "bin"]
    }
    fn export(&self, pixels: &PixelBuffer, out: &mut dyn std::io::Write) -> Result<(), ExportError> {
        out.write_all(pixels.data())?;
        Ok(())
    }
}

pub struct ExportFilterRegistry {
    filters: parking_lot::RwLock<Vec<Arc<dyn ExportFilter>>>,
}
impl Default for ExportFilterRegistry {
    fn default() -> Self {
        Self {
            filters: parking_lot::RwLock::new(vec![Arc::new(RawExportFilter)]),
        }
    }
}
impl ExportFilterRegistry {
    /// An empty registry, without even the raw filter.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            filters: parking_lot::RwLock::default(),
        }
    }
    pub fn register(&self, filter: Arc<dyn ExportFilter>) -> Result<(), ExportError> {
        let mut filters = self.filters.write();
        if filters.iter().any(|existing| existing.id() == filter.id()) {
            return Err(ExportError::Duplicate(filter.id().to_owned()));
        }
        log::trace!(
            "registered export filter {} for {:?}",
            filter.id(),
            filter.extensions()
        );
        filters.push(filter);
        Ok(())
    }
    fn find(&self, pred: impl Fn(&dyn ExportFilter) -> bool) -> Option<Arc<dyn ExportFilter>> {
        self.filters
            .read()
            .iter()
            .find(|filter| pred(Arc::as_ref(filter)))
            .cloned()
    }
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<Arc<dyn ExportFilter>> {
        self.find(|filter| filter.id() == id)
    }
    #[must_use]
    pub fn by_mime(&self, mime: &str) -> Option<Arc<dyn ExportFilter>> {
        self.find(|filter| {
            filter
                .mime_types()
                .iter()
                .any(|known| known.eq_ignore_ascii_case(mime))
        })
    }
    /// Case insensitive, with or without the leading dot.
    #[must_use]
    pub fn by_extension(&self, extension: &str) -> Option<Arc<dyn ExportFilter>> {
        let extension = extension.trim_start_matches('.');
        self.find(|filter| {
            filter
                .extensions()
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
    }
    /// Every registered MIME type, in registration order.
    #[must_use]
    pub fn mime_types(&self) -> Vec<String> {
        self.filters
            .read()
            .iter()
            .flat_map(|filter| filter.mime_types().iter().map(|mime| (*mime).to_owned()))
            .collect()
    }
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        self.filters
            .read()
            .iter()
            .flat_map(|filter| filter.extensions().iter().map(|ext| (*ext).to_owned()))
            .collect()
    }
}

/// The process-wide registry, holding the raw filter until more are registered.
pub fn global() -> &'static ExportFilterRegistry {
    static REGISTRY: OnceLock<ExportFilterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ExportFilterRegistry::default)
}

/// Shared flag to stop an export between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where encoded frames go.
pub trait FrameSink {
    fn write_frame(&mut self, frame: usize, encoded: Vec<u8>) -> Result<(), ExportError>;
}
/// Keeps every frame in memory, in order.
impl FrameSink for Vec<Vec<u8>> {
    fn write_frame(&mut self, _: usize, encoded: Vec<u8>) -> Result<(), ExportError> {
        self.push(encoded);
        Ok(())
    }
}
/// Writes each frame to its own file, `{stem}{frame:04}.{extension}` inside `directory`.
pub struct FileSequence {
    pub directory: std::path::PathBuf,
    pub stem: String,
    pub extension: String,
}
impl FileSequence {
    #[must_use]
    pub fn path(&self, frame: usize) -> std::path::PathBuf {
        self.directory
            .join(format!("{}{frame:04}.{}", self.stem, self.extension))
    }
}
impl FrameSink for FileSequence {
    fn write_frame(&mut self, frame: usize, encoded: Vec<u8>) -> Result<(), ExportError> {
        std::fs::write(self.path(frame), encoded)?;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportStatus {
    Completed { frames: usize },
    /// Stopped by the cancel token after writing `frames` frames.
    Cancelled { frames: usize },
}

pub struct FrameExporter {
    filter: Arc<dyn ExportFilter>,
    cancel: CancelToken,
}
impl FrameExporter {
    #[must_use]
    pub fn new(filter: Arc<dyn ExportFilter>, cancel: CancelToken) -> Self {
        Self { filter, cancel }
    }
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
    /// Render and write `frames` in order. `render` produces the pixels of one frame.
    ///
    /// Cancellation is checked before each frame, a frame in progress always completes.
    pub fn export(
        &self,
        frames: Range<usize>,
        mut render: impl FnMut(usize) -> Result<PixelBuffer, ExportError>,
        sink: &mut dyn FrameSink,
    ) -> Result<ExportStatus, ExportError> {
        let mut written = 0;
        for frame in frames {
            if self.cancel.is_cancelled() {
                log::info!("export cancelled after {written} frames");
                return Ok(ExportStatus::Cancelled { frames: written });
            }
            let pixels = render(frame)?;
            let mut encoded = Vec::new();
            self.filter.export(&pixels, &mut encoded)?;
            sink.write_frame(frame, encoded)?;
            written += 1;
        }
        Ok(ExportStatus::Completed { frames: written })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{
        CancelToken, ExportError, ExportFilterRegistry, ExportStatus, FileSequence, FrameExporter,
        RawExportFilter,
    };
    use crate::colorspace::builtin;
    use crate::device::PixelBuffer;
    use crate::util::Rect;

    fn frame(value: u8) -> PixelBuffer {
        PixelBuffer::filled(
            Rect::new(0, 0, 1, 1),
            Arc::new(builtin::rgba8()),
            &[value, value, value, 255],
        )
        .unwrap()
    }

    #[test]
    fn lookups() {
        let registry = ExportFilterRegistry::default();
        assert!(registry.by_id("raw").is_some());
        assert!(registry.by_extension(".RAW").is_some());
        assert!(registry.by_mime("Application/Octet-Stream").is_some());
        assert!(registry.by_extension("png").is_none());
        assert!(matches!(
            registry.register(Arc::new(RawExportFilter)),
            Err(ExportError::Duplicate(_))
        ));
        assert!(ExportFilterRegistry::empty().by_id("raw").is_none());
        assert_eq!(registry.extensions(), ["raw", "bin"]);
    }
    #[test]
    fn all_frames_written() {
        let exporter = FrameExporter::new(Arc::new(RawExportFilter), CancelToken::new());
        let mut frames: Vec<Vec<u8>> = Vec::new();
        let status = exporter
            .export(0..3, |i| Ok(frame(i as u8)), &mut frames)
            .unwrap();
        assert_eq!(status, ExportStatus::Completed { frames: 3 });
        assert_eq!(frames[2], [2, 2, 2, 255]);
    }
    #[test]
    fn cancel_stops_between_frames() {
        let cancel = CancelToken::new();
        let exporter = FrameExporter::new(Arc::new(RawExportFilter), cancel.clone());
        let mut frames: Vec<Vec<u8>> = Vec::new();
        let status = exporter
            .export(
                0..10,
                |i| {
                    if i == 1 {
                        cancel.cancel();
                    }
                    Ok(frame(i as u8))
                },
                &mut frames,
            )
            .unwrap();
        assert_eq!(status, ExportStatus::Cancelled { frames: 2 });
        assert_eq!(frames.len(), 2);
    }
    #[test]
    fn sequence_paths() {
        let sequence = FileSequence {
            directory: "out".into(),
            stem: "walk_".into(),
            extension: "png".into(),
        };
        assert_eq!(
            sequence.path(7),
            std::path::Path::new("out").join("walk_0007.png")
        );
    }
}
