//! GPU interop resources and the native API seams they drive.

pub mod backend;
pub mod buffer;

pub use backend::{
    BufferId, ComputeDevice, ComputeInterop, DevicePtr, DeviceSelector, InteropHandle,
    MappedRange, RasterApi, RasterBackend, RasterBuffer, RegisterFlags,
};
pub use buffer::{DeviceBuffer, InteropRasterBuffer, InteropState, RasterInterop};
