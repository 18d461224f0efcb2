//! Headless raster backend.
//!
//! Hands out buffer names and tracks bindings in memory. The rendering
//! context belongs to the thread that created the backend; any
//! context-bound call from another thread fails, which makes misplaced
//! context-affine work observable in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::trace;

use crate::core::error::InteropError;
use crate::core::interop::{BufferId, RasterApi, RasterBackend, RasterBuffer};

/// Call counters for a [`HeadlessRaster`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterCalls {
    /// Successful `make_context_current` calls.
    pub make_current: usize,
    /// Buffers created.
    pub created: usize,
    /// Buffers destroyed.
    pub destroyed: usize,
    /// Storage bindings made.
    pub binds: usize,
}

/// In-memory raster backend bound to its creating thread.
#[derive(Debug)]
pub struct HeadlessRaster {
    api: RasterApi,
    owner: ThreadId,
    next_id: AtomicU32,
    buffers: Mutex<HashMap<BufferId, usize>>,
    bindings: Mutex<HashMap<u32, BufferId>>,
    make_current: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    binds: AtomicUsize,
    fail_next: Mutex<Option<&'static str>>,
}

impl HeadlessRaster {
    /// OpenGL-flavoured backend whose context lives on the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api(RasterApi::OpenGl)
    }

    /// Backend reporting `api`, context on the calling thread.
    #[must_use]
    pub fn with_api(api: RasterApi) -> Self {
        Self {
            api,
            owner: thread::current().id(),
            next_id: AtomicU32::new(1),
            buffers: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            make_current: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            binds: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// Thread that owns the rendering context.
    #[must_use]
    pub const fn context_owner(&self) -> ThreadId {
        self.owner
    }

    /// Make the next call of `operation` fail with a native error.
    pub fn fail_next(&self, operation: &'static str) {
        *self.fail_next.lock() = Some(operation);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn calls(&self) -> RasterCalls {
        RasterCalls {
            make_current: self.make_current.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            binds: self.binds.load(Ordering::Relaxed),
        }
    }

    /// Buffers created and not yet destroyed.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Buffer bound at storage slot `slot`.
    #[must_use]
    pub fn binding(&self, slot: u32) -> Option<BufferId> {
        self.bindings.lock().get(&slot).copied()
    }

    fn check_injected(&self, operation: &'static str) -> Result<(), InteropError> {
        let mut fail = self.fail_next.lock();
        if *fail == Some(operation) {
            *fail = None;
            return Err(InteropError::native(operation, "injected failure"));
        }
        Ok(())
    }

    fn check_context(&self, operation: &'static str) -> Result<(), InteropError> {
        let caller = thread::current().id();
        if caller == self.owner {
            Ok(())
        } else {
            Err(InteropError::native(
                operation,
                format!("context owned by {:?}, called from {caller:?}", self.owner),
            ))
        }
    }
}

impl Default for HeadlessRaster {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for HeadlessRaster {
    fn api(&self) -> RasterApi {
        self.api
    }

    fn make_context_current(&self) -> Result<(), InteropError> {
        self.check_injected("make_context_current")?;
        self.check_context("make_context_current")?;
        self.make_current.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_buffer(&self, bytes: usize) -> Result<RasterBuffer, InteropError> {
        self.check_injected("create_buffer")?;
        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(id, bytes);
        self.created.fetch_add(1, Ordering::Relaxed);
        trace!(buffer = %id, bytes, "headless buffer created");
        Ok(RasterBuffer { id, bytes })
    }

    fn destroy_buffer(&self, buffer: RasterBuffer) -> Result<(), InteropError> {
        self.check_injected("destroy_buffer")?;
        if self.buffers.lock().remove(&buffer.id).is_none() {
            return Err(InteropError::native(
                "destroy_buffer",
                format!("unknown {}", buffer.id),
            ));
        }
        self.bindings.lock().retain(|_, bound| *bound != buffer.id);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn bind_storage_buffer(&self, buffer: &RasterBuffer, slot: u32) -> Result<(), InteropError> {
        self.check_injected("bind_storage_buffer")?;
        self.check_context("bind_storage_buffer")?;
        if !self.buffers.lock().contains_key(&buffer.id) {
            return Err(InteropError::native(
                "bind_storage_buffer",
                format!("unknown {}", buffer.id),
            ));
        }
        self.bindings.lock().insert(slot, buffer.id);
        self.binds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
