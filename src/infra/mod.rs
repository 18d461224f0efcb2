//! Infrastructure adapters for raster and compute backends.

pub mod compute;
pub mod raster;
pub use compute::HostInterop;
pub use raster::HeadlessRaster;
