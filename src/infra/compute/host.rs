//! Host-memory compute interop.
//!
//! Registrations live in a map; mapping hands out a stable fake device
//! address per registration. Also acts as the device selector, ranking the
//! configured devices by memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::core::error::InteropError;
use crate::core::interop::{
    BufferId, ComputeDevice, ComputeInterop, DevicePtr, DeviceSelector, InteropHandle,
    MappedRange, RasterBuffer, RegisterFlags,
};

const ADDRESS_BASE: u64 = 0x7f00_0000_0000;
const ADDRESS_STRIDE: u64 = 0x1_0000_0000;

/// Call counters for a [`HostInterop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropCalls {
    /// Buffers registered.
    pub registrations: usize,
    /// Registrations dropped.
    pub unregistrations: usize,
    /// Successful maps.
    pub maps: usize,
    /// Successful unmaps.
    pub unmaps: usize,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    buffer: BufferId,
    bytes: usize,
    flags: RegisterFlags,
    mapped: bool,
}

/// In-memory compute interop API.
#[derive(Debug)]
pub struct HostInterop {
    devices: Vec<ComputeDevice>,
    next_handle: AtomicU64,
    registrations: Mutex<HashMap<InteropHandle, Registration>>,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
    fail_next: Mutex<Option<&'static str>>,
}

impl HostInterop {
    /// One host device.
    #[must_use]
    pub fn new() -> Self {
        Self::with_devices(vec![ComputeDevice::new(0, "host", 0)])
    }

    /// Interop over an explicit device list.
    #[must_use]
    pub fn with_devices(devices: Vec<ComputeDevice>) -> Self {
        Self {
            devices,
            next_handle: AtomicU64::new(1),
            registrations: Mutex::new(HashMap::new()),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// Make the next call of `operation` fail with a native error.
    pub fn fail_next(&self, operation: &'static str) {
        *self.fail_next.lock() = Some(operation);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn calls(&self) -> InteropCalls {
        InteropCalls {
            registrations: self.registered.load(Ordering::Relaxed),
            unregistrations: self.unregistered.load(Ordering::Relaxed),
            maps: self.maps.load(Ordering::Relaxed),
            unmaps: self.unmaps.load(Ordering::Relaxed),
        }
    }

    /// Registrations currently held.
    #[must_use]
    pub fn live_registrations(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Flags a registration was made with.
    #[must_use]
    pub fn flags_of(&self, handle: InteropHandle) -> Option<RegisterFlags> {
        self.registrations.lock().get(&handle).map(|r| r.flags)
    }

    fn check_injected(&self, operation: &'static str) -> Result<(), InteropError> {
        let mut fail = self.fail_next.lock();
        if *fail == Some(operation) {
            *fail = None;
            return Err(InteropError::native(operation, "injected failure"));
        }
        Ok(())
    }

    fn address_of(handle: InteropHandle) -> Result<DevicePtr, InteropError> {
        handle
            .0
            .checked_mul(ADDRESS_STRIDE)
            .and_then(|offset| offset.checked_add(ADDRESS_BASE))
            .and_then(DevicePtr::new)
            .ok_or_else(|| InteropError::native("map", "address space exhausted"))
    }
}

impl Default for HostInterop {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeInterop for HostInterop {
    fn register_buffer(
        &self,
        buffer: &RasterBuffer,
        flags: RegisterFlags,
    ) -> Result<InteropHandle, InteropError> {
        self.check_injected("register_buffer")?;
        let handle = InteropHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().insert(
            handle,
            Registration {
                buffer: buffer.id,
                bytes: buffer.bytes,
                flags,
                mapped: false,
            },
        );
        self.registered.fetch_add(1, Ordering::Relaxed);
        trace!(handle = handle.0, buffer = %buffer.id, ?flags, "buffer registered");
        Ok(handle)
    }

    fn unregister(&self, handle: InteropHandle) -> Result<(), InteropError> {
        self.check_injected("unregister")?;
        let mut registrations = self.registrations.lock();
        match registrations.get(&handle) {
            Some(reg) if reg.mapped => Err(InteropError::native(
                "unregister",
                format!("{} is still mapped", reg.buffer),
            )),
            Some(_) => {
                registrations.remove(&handle);
                self.unregistered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(InteropError::native(
                "unregister",
                format!("unknown handle {}", handle.0),
            )),
        }
    }

    fn map(&self, handle: InteropHandle) -> Result<MappedRange, InteropError> {
        self.check_injected("map")?;
        let mut registrations = self.registrations.lock();
        let reg = registrations
            .get_mut(&handle)
            .ok_or_else(|| InteropError::native("map", format!("unknown handle {}", handle.0)))?;
        if reg.mapped {
            return Err(InteropError::native("map", "already mapped"));
        }
        let ptr = Self::address_of(handle)?;
        reg.mapped = true;
        self.maps.fetch_add(1, Ordering::Relaxed);
        Ok(MappedRange {
            ptr,
            bytes: reg.bytes,
        })
    }

    fn unmap(&self, handle: InteropHandle) -> Result<(), InteropError> {
        self.check_injected("unmap")?;
        let mut registrations = self.registrations.lock();
        let reg = registrations
            .get_mut(&handle)
            .ok_or_else(|| InteropError::native("unmap", format!("unknown handle {}", handle.0)))?;
        if !reg.mapped {
            return Err(InteropError::native("unmap", "not mapped"));
        }
        reg.mapped = false;
        self.unmaps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl DeviceSelector for HostInterop {
    fn best_device(&self) -> Result<ComputeDevice, InteropError> {
        self.devices
            .iter()
            .max_by(|a, b| {
                a.memory_bytes
                    .cmp(&b.memory_bytes)
                    .then(b.ordinal.cmp(&a.ordinal))
            })
            .cloned()
            .ok_or_else(|| InteropError::native("best_device", "no compute device available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(id: u32) -> RasterBuffer {
        RasterBuffer {
            id: BufferId(id),
            bytes: 64,
        }
    }

    #[test]
    fn test_map_unmap_cycle() {
        let interop = HostInterop::new();
        let handle = interop
            .register_buffer(&buffer(1), RegisterFlags::WriteDiscard)
            .unwrap();
        let range = interop.map(handle).unwrap();
        assert_eq!(range.bytes, 64);
        assert!(interop.map(handle).is_err());
        assert!(interop.unregister(handle).is_err());
        interop.unmap(handle).unwrap();
        interop.unregister(handle).unwrap();

        let handle = interop
            .register_buffer(&buffer(2), RegisterFlags::None)
            .unwrap();
        assert_eq!(interop.flags_of(handle), Some(RegisterFlags::None));
        interop.unregister(handle).unwrap();
        assert_eq!(interop.calls().registrations, 2);
        assert_eq!(interop.calls().unregistrations, 2);
        assert_eq!(interop.live_registrations(), 0);
    }

    #[test]
    fn test_best_device_prefers_memory() {
        let interop = HostInterop::with_devices(vec![
            ComputeDevice::new(0, "small", 4 << 30),
            ComputeDevice::new(1, "large", 16 << 30),
            ComputeDevice::new(2, "large-twin", 16 << 30),
        ]);
        assert_eq!(interop.best_device().unwrap().ordinal, 1);
        assert!(HostInterop::with_devices(Vec::new()).best_device().is_err());
    }
}
