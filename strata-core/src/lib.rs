//! # Strata core
//!
//! A layered raster compositing engine. An [`image::Image`] owns a tree of layers and masks,
//! tracks which rectangles of it are stale, and recomposes them on request through
//! [`compositor::Compositor`], with all pixel arithmetic delegated to the
//! [`colorspace::ColorSpace`] of the pixels involved.

pub mod blend;
pub mod colorspace;
pub mod commands;
pub mod compositor;
pub mod device;
pub mod dirty;
pub mod export;
pub mod filter;
pub mod graph;
pub mod id;
pub mod image;
pub mod paint;
pub mod settings;
pub mod util;

pub use graph::NodeID;
pub use image::Image;
pub use util::Rect;
