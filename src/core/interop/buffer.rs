//! Raster buffer shared between a graphics API and a compute API.
//!
//! [`InteropRasterBuffer`] composes two capabilities: the device-buffer view
//! ([`DeviceBuffer`]: resident device, length, mapped pointer) and the
//! raster-interop link ([`RasterInterop`]: resize, map, unmap, bind). Every
//! native call that needs the rendering context runs as a HIGH, IMMEDIATE,
//! context-affine task followed by `block`, so it executes on the thread that
//! owns the context and its post-conditions are visible when the call returns.
//!
//! Lifecycle:
//!
//! ```text
//! Unallocated ──resize(n)──► Allocated ──register──► Registered ──map──► Mapped
//!                                                        ▲                │
//!                                     resize(n) ─────────┤              unmap
//!                                                        │                ▼
//!                                                        └──── map ◄── Unmapped
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{
    ComputeDevice, ComputeInterop, DevicePtr, DeviceSelector, InteropHandle, MappedRange,
    RasterApi, RasterBackend, RasterBuffer, RegisterFlags,
};
use crate::core::error::InteropError;
use crate::core::scheduler::Scheduler;
use crate::core::task::{LaunchPolicy, Priority};
use crate::util::fail_fast;

/// Lifecycle state of an interop resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteropState {
    /// No backend buffer.
    #[default]
    Unallocated,
    /// Backend buffer exists, not registered with the compute API.
    Allocated,
    /// Registered, not mapped.
    Registered,
    /// Mapped; the device pointer is valid.
    Mapped,
    /// Registered again after an unmap.
    Unmapped,
}

impl InteropState {
    /// Lowercase state name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unallocated => "unallocated",
            Self::Allocated => "allocated",
            Self::Registered => "registered",
            Self::Mapped => "mapped",
            Self::Unmapped => "unmapped",
        }
    }

    /// Whether a compute registration exists.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Mapped | Self::Unmapped)
    }
}

/// Device-buffer capability: where the data lives and how to reach it.
pub trait DeviceBuffer<T> {
    /// Device the buffer is resident on.
    fn device(&self) -> &ComputeDevice;

    /// Number of elements.
    fn len(&self) -> usize;

    /// `true` when no elements are allocated.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocation size in bytes.
    fn size_in_bytes(&self) -> usize {
        self.len() * mem::size_of::<T>()
    }

    /// Compute-visible pointer, present only while mapped.
    fn data(&self) -> Option<DevicePtr>;

    /// Make `device` the resident device.
    fn move_to(&mut self, device: &ComputeDevice) -> Result<(), InteropError>;
}

/// Raster-interop capability. Native failures are fatal.
pub trait RasterInterop {
    /// Map the registration; the device pointer becomes valid.
    fn map_resources(&mut self);

    /// Release the mapping; the device pointer is invalidated.
    fn unmap_resources(&mut self);

    /// Bind the backend buffer to a shader storage slot.
    fn bind_data(&mut self, slot: u32);

    /// Reallocate for `len` elements and register the new buffer. `0` is a no-op.
    fn resize(&mut self, len: usize);
}

/// Device-side view of the resource.
#[derive(Debug)]
struct DeviceView<T> {
    device: ComputeDevice,
    len: usize,
    mapped: Option<MappedRange>,
    _element: PhantomData<fn() -> T>,
}

impl<T> DeviceBuffer<T> for DeviceView<T> {
    fn device(&self) -> &ComputeDevice {
        &self.device
    }

    fn len(&self) -> usize {
        self.len
    }

    fn data(&self) -> Option<DevicePtr> {
        self.mapped.map(|range| range.ptr)
    }

    fn move_to(&mut self, device: &ComputeDevice) -> Result<(), InteropError> {
        if device.ordinal == self.device.ordinal {
            return Ok(());
        }
        warn!(
            from = self.device.ordinal,
            to = device.ordinal,
            "Cross-device migration requested"
        );
        Err(InteropError::MigrationUnsupported)
    }
}

/// Native handles, touched only from context-affine tasks.
#[derive(Debug, Default)]
struct LinkState {
    state: InteropState,
    buffer: Option<RasterBuffer>,
    handle: Option<InteropHandle>,
    mapped: Option<MappedRange>,
}

impl LinkState {
    /// Unmap, unregister and destroy whatever is held.
    fn release<R: RasterBackend, C: ComputeInterop>(
        &mut self,
        raster: &R,
        compute: &C,
    ) -> Result<(), InteropError> {
        if let Some(handle) = self.handle {
            if self.state == InteropState::Mapped {
                compute.unmap(handle)?;
                self.mapped = None;
                self.state = InteropState::Unmapped;
            }
            compute.unregister(handle)?;
            self.handle = None;
            self.state = InteropState::Allocated;
        }
        if let Some(buffer) = self.buffer.take() {
            raster.destroy_buffer(buffer)?;
            debug!(buffer = %buffer.id, "Raster buffer destroyed");
        }
        self.state = InteropState::Unallocated;
        Ok(())
    }
}

/// Destroy a buffer that never became part of the resource.
fn discard<R: RasterBackend>(raster: &R, buffer: RasterBuffer) {
    if let Err(e) = raster.destroy_buffer(buffer) {
        warn!(buffer = %buffer.id, error = %e, "Failed to destroy discarded raster buffer");
    }
}

/// Raster-interop side of the resource.
struct RasterLink<R, C> {
    scheduler: Scheduler,
    raster: Arc<R>,
    compute: Arc<C>,
    api: RasterApi,
    flags: RegisterFlags,
    shared: Arc<Mutex<LinkState>>,
}

impl<R: RasterBackend, C: ComputeInterop> RasterLink<R, C> {
    fn state(&self) -> InteropState {
        self.shared.lock().state
    }

    /// Run `f` on this thread's rendering context and wait for it.
    fn run_affine<U, F>(&self, operation: &'static str, f: F) -> Result<U, InteropError>
    where
        U: Send + 'static,
        F: FnOnce(&R, &C, &mut LinkState) -> Result<U, InteropError> + Send + 'static,
    {
        let raster = Arc::clone(&self.raster);
        let compute = Arc::clone(&self.compute);
        let shared = Arc::clone(&self.shared);
        let slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);

        self.scheduler
            .try_add_task(Priority::High, LaunchPolicy::Immediate, true, move || {
                let result = raster
                    .make_context_current()
                    .and_then(|()| f(raster.as_ref(), compute.as_ref(), &mut *shared.lock()));
                *out.lock() = Some(result);
            })?;
        self.scheduler.block();

        let result = slot.lock().take();
        result.unwrap_or_else(|| Err(InteropError::native(operation, "affine task did not run")))
    }
}

/// Interop raster buffer of `T` elements.
pub struct InteropRasterBuffer<T, R: RasterBackend, C: ComputeInterop> {
    device: DeviceView<T>,
    link: RasterLink<R, C>,
}

impl<T, R: RasterBackend, C: ComputeInterop> InteropRasterBuffer<T, R, C> {
    /// Create an unallocated resource resident on `device`.
    pub fn new(
        scheduler: Scheduler,
        raster: Arc<R>,
        compute: Arc<C>,
        device: ComputeDevice,
        flags: RegisterFlags,
    ) -> Self {
        let api = raster.api();
        debug!(device = device.ordinal, ?api, ?flags, "Interop buffer created");
        Self {
            device: DeviceView {
                device,
                len: 0,
                mapped: None,
                _element: PhantomData,
            },
            link: RasterLink {
                scheduler,
                raster,
                compute,
                api,
                flags,
                shared: Arc::new(Mutex::new(LinkState::default())),
            },
        }
    }

    /// Create an unallocated resource on the device `selector` ranks best.
    pub fn on_best_device(
        scheduler: Scheduler,
        raster: Arc<R>,
        compute: Arc<C>,
        selector: &impl DeviceSelector,
        flags: RegisterFlags,
    ) -> Result<Self, InteropError> {
        let device = selector.best_device()?;
        Ok(Self::new(scheduler, raster, compute, device, flags))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InteropState {
        self.link.state()
    }

    /// Graphics API this resource routes through.
    #[must_use]
    pub const fn api(&self) -> RasterApi {
        self.link.api
    }

    /// Backend buffer, once allocated.
    #[must_use]
    pub fn raster_buffer(&self) -> Option<RasterBuffer> {
        self.link.shared.lock().buffer
    }

    /// Compute registration, once registered.
    #[must_use]
    pub fn interop_handle(&self) -> Option<InteropHandle> {
        self.link.shared.lock().handle
    }

    /// Reallocate for `len` elements, releasing any previous buffer first.
    pub fn try_resize(&mut self, len: usize) -> Result<(), InteropError> {
        if len == 0 {
            debug!("Resize to zero elements ignored");
            return Ok(());
        }
        let bytes = len
            .checked_mul(mem::size_of::<T>())
            .filter(|bytes| *bytes > 0)
            .ok_or_else(|| {
                InteropError::native("resize", format!("{len} elements is not a valid allocation"))
            })?;

        let buffer = self.link.raster.create_buffer(bytes)?;
        debug!(buffer = %buffer.id, bytes, "Raster buffer allocated");

        match self.link.api {
            RasterApi::OpenGl => {
                let flags = self.link.flags;
                // Taken by the task; left here if the scheduler refuses it.
                let pending = Arc::new(Mutex::new(Some(buffer)));
                let staged = Arc::clone(&pending);
                let result = self.link.run_affine("register", move |raster, compute, link| {
                    let taken = staged.lock().take();
                    let Some(buffer) = taken else {
                        return Err(InteropError::native("register", "no staged buffer"));
                    };
                    if let Err(e) = link.release(raster, compute) {
                        discard(raster, buffer);
                        return Err(e);
                    }
                    match compute.register_buffer(&buffer, flags) {
                        Ok(handle) => {
                            link.buffer = Some(buffer);
                            link.handle = Some(handle);
                            link.state = InteropState::Registered;
                            debug!(buffer = %buffer.id, handle = handle.0, "Buffer registered");
                            Ok(())
                        }
                        Err(e) => {
                            discard(raster, buffer);
                            Err(e)
                        }
                    }
                });
                let unclaimed = pending.lock().take();
                if let Some(buffer) = unclaimed {
                    discard(self.link.raster.as_ref(), buffer);
                }
                self.sync_view(buffer, len);
                result
            }
            RasterApi::Vulkan => {
                let old = {
                    let mut link = self.link.shared.lock();
                    link.state = InteropState::Allocated;
                    link.buffer.replace(buffer)
                };
                self.sync_view(buffer, len);
                warn!("Vulkan interop registration is not supported, buffer left unregistered");
                match old {
                    Some(old) => self.link.raster.destroy_buffer(old),
                    None => Ok(()),
                }
            }
        }
    }

    /// Refresh the device view from the link after a resize attempt.
    fn sync_view(&mut self, staged: RasterBuffer, len: usize) {
        let link = self.link.shared.lock();
        self.device.mapped = link.mapped;
        match link.buffer {
            Some(current) if current.id == staged.id => self.device.len = len,
            None => self.device.len = 0,
            Some(_) => {}
        }
    }

    /// Map the registration and expose the device pointer.
    pub fn try_map(&mut self) -> Result<(), InteropError> {
        if self.link.api == RasterApi::Vulkan {
            warn!("Vulkan interop mapping is not supported");
            return Ok(());
        }
        match self.state() {
            InteropState::Registered | InteropState::Unmapped => {}
            InteropState::Unallocated | InteropState::Allocated => {
                return Err(InteropError::NotRegistered)
            }
            state @ InteropState::Mapped => {
                return Err(InteropError::InvalidTransition {
                    operation: "map",
                    state: state.name(),
                })
            }
        }
        let range = self.link.run_affine("map", |_, compute, link| {
            let handle = link.handle.ok_or(InteropError::NotRegistered)?;
            let range = compute.map(handle)?;
            link.mapped = Some(range);
            link.state = InteropState::Mapped;
            Ok(range)
        })?;
        debug!(ptr = %range.ptr, bytes = range.bytes, "Resources mapped");
        self.device.mapped = Some(range);
        Ok(())
    }

    /// Release the mapping and invalidate the device pointer.
    pub fn try_unmap(&mut self) -> Result<(), InteropError> {
        if self.link.api == RasterApi::Vulkan {
            warn!("Vulkan interop unmapping is not supported");
            return Ok(());
        }
        let state = self.state();
        if state != InteropState::Mapped {
            return Err(InteropError::InvalidTransition {
                operation: "unmap",
                state: state.name(),
            });
        }
        self.link.run_affine("unmap", |_, compute, link| {
            let handle = link.handle.ok_or(InteropError::NotRegistered)?;
            compute.unmap(handle)?;
            link.mapped = None;
            link.state = InteropState::Unmapped;
            Ok(())
        })?;
        self.device.mapped = None;
        debug!("Resources unmapped");
        Ok(())
    }

    /// Bind the backend buffer to shader storage slot `slot`.
    pub fn try_bind(&mut self, slot: u32) -> Result<(), InteropError> {
        if self.link.api == RasterApi::Vulkan {
            warn!(slot, "Vulkan buffer binding is not supported");
            return Ok(());
        }
        let state = self.state();
        if state == InteropState::Unallocated {
            return Err(InteropError::InvalidTransition {
                operation: "bind_data",
                state: state.name(),
            });
        }
        self.link.run_affine("bind_data", move |raster, _, link| {
            let buffer = link.buffer.ok_or(InteropError::InvalidTransition {
                operation: "bind_data",
                state: link.state.name(),
            })?;
            raster.bind_storage_buffer(&buffer, slot)
        })?;
        debug!(slot, "Buffer bound");
        Ok(())
    }

    fn release(&mut self) -> Result<(), InteropError> {
        self.device.mapped = None;
        if self.link.scheduler.running() {
            return self
                .link
                .run_affine("release", |raster, compute, link| link.release(raster, compute));
        }
        self.link.raster.make_context_current()?;
        self.link
            .shared
            .lock()
            .release(self.link.raster.as_ref(), self.link.compute.as_ref())
    }
}

impl<T, R: RasterBackend, C: ComputeInterop> DeviceBuffer<T> for InteropRasterBuffer<T, R, C> {
    fn device(&self) -> &ComputeDevice {
        self.device.device()
    }

    fn len(&self) -> usize {
        self.device.len()
    }

    fn data(&self) -> Option<DevicePtr> {
        self.device.data()
    }

    fn move_to(&mut self, device: &ComputeDevice) -> Result<(), InteropError> {
        self.device.move_to(device)
    }
}

impl<T, R: RasterBackend, C: ComputeInterop> RasterInterop for InteropRasterBuffer<T, R, C> {
    fn map_resources(&mut self) {
        fail_fast("map_resources", self.try_map());
    }

    fn unmap_resources(&mut self) {
        fail_fast("unmap_resources", self.try_unmap());
    }

    fn bind_data(&mut self, slot: u32) {
        fail_fast("bind_data", self.try_bind(slot));
    }

    fn resize(&mut self, len: usize) {
        fail_fast("resize", self.try_resize(len));
    }
}

impl<T, R: RasterBackend, C: ComputeInterop> Drop for InteropRasterBuffer<T, R, C> {
    fn drop(&mut self) {
        if self.state() == InteropState::Unallocated {
            return;
        }
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to release interop buffer");
        }
    }
}

impl<T, R: RasterBackend, C: ComputeInterop> fmt::Debug for InteropRasterBuffer<T, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteropRasterBuffer")
            .field("device", &self.device.device.ordinal)
            .field("len", &self.device.len)
            .field("api", &self.link.api)
            .field("state", &self.state())
            .field("mapped", &self.device.mapped)
            .finish()
    }
}
