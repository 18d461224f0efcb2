//! Native API seams consumed by interop resources.
//!
//! A raster backend owns graphics buffers and the thread-bound rendering
//! context. A compute interop API registers those buffers and maps them into
//! the compute address space. Both are opaque to the scheduler.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::core::error::InteropError;

/// Graphics API a raster backend drives. Selected once, at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterApi {
    /// OpenGL: full interop support.
    #[default]
    OpenGl,
    /// Vulkan: interop operations are accepted but not performed.
    Vulkan,
}

/// Native buffer name handed out by the raster backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// A raster-side buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterBuffer {
    /// Native buffer name.
    pub id: BufferId,
    /// Allocation size in bytes.
    pub bytes: usize,
}

/// Compute-side registration of a raster buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteropHandle(pub u64);

/// Non-null device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(NonZeroU64);

impl DevicePtr {
    /// Wrap a raw address; `None` for null.
    #[must_use]
    pub const fn new(addr: u64) -> Option<Self> {
        match NonZeroU64::new(addr) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Raw address.
    #[must_use]
    pub const fn addr(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

/// Device view of a mapped registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    /// First byte of the mapping.
    pub ptr: DevicePtr,
    /// Mapped length in bytes.
    pub bytes: usize,
}

/// Access hint given to the compute API at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterFlags {
    /// Read and write, contents preserved.
    None,
    /// Compute side only reads.
    ReadOnly,
    /// Compute side overwrites the whole buffer; previous contents are discarded.
    #[default]
    WriteDiscard,
}

/// A compute device a resource can be resident on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeDevice {
    /// Driver ordinal.
    pub ordinal: u32,
    /// Human-readable device name.
    pub name: String,
    /// Device memory in bytes, used to rank devices.
    pub memory_bytes: u64,
}

impl ComputeDevice {
    /// Describe a device.
    pub fn new(ordinal: u32, name: impl Into<String>, memory_bytes: u64) -> Self {
        Self {
            ordinal,
            name: name.into(),
            memory_bytes,
        }
    }
}

/// Graphics-side operations. Calls that touch the rendering context must be
/// made on the thread owning it.
pub trait RasterBackend: Send + Sync + 'static {
    /// Which graphics API this backend drives.
    fn api(&self) -> RasterApi;

    /// Bind the rendering context to the calling thread.
    fn make_context_current(&self) -> Result<(), InteropError>;

    /// Allocate a buffer of `bytes` bytes.
    fn create_buffer(&self, bytes: usize) -> Result<RasterBuffer, InteropError>;

    /// Free a buffer previously returned by `create_buffer`.
    fn destroy_buffer(&self, buffer: RasterBuffer) -> Result<(), InteropError>;

    /// Bind `buffer` to shader storage binding `slot`.
    fn bind_storage_buffer(&self, buffer: &RasterBuffer, slot: u32) -> Result<(), InteropError>;
}

/// Compute-side interop operations on raster buffers.
pub trait ComputeInterop: Send + Sync + 'static {
    /// Register `buffer` for compute access.
    fn register_buffer(
        &self,
        buffer: &RasterBuffer,
        flags: RegisterFlags,
    ) -> Result<InteropHandle, InteropError>;

    /// Drop a registration.
    fn unregister(&self, handle: InteropHandle) -> Result<(), InteropError>;

    /// Map a registration into the compute address space.
    fn map(&self, handle: InteropHandle) -> Result<MappedRange, InteropError>;

    /// Release a mapping.
    fn unmap(&self, handle: InteropHandle) -> Result<(), InteropError>;
}

/// Picks the device new resources become resident on.
pub trait DeviceSelector {
    /// The most capable available device.
    fn best_device(&self) -> Result<ComputeDevice, InteropError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_ptr_rejects_null() {
        assert!(DevicePtr::new(0).is_none());
        let ptr = DevicePtr::new(0x1000).unwrap();
        assert_eq!(ptr.addr(), 0x1000);
        assert_eq!(ptr.to_string(), "0x1000");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RasterApi::default(), RasterApi::OpenGl);
        assert_eq!(RegisterFlags::default(), RegisterFlags::WriteDiscard);
        assert_eq!(
            serde_json::to_string(&RegisterFlags::WriteDiscard).unwrap(),
            "\"write_discard\""
        );
    }
}
