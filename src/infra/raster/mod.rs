//! Raster backends.

pub mod headless;

pub use headless::{HeadlessRaster, RasterCalls};
