//! Compute interop backends.

pub mod host;

pub use host::{HostInterop, InteropCalls};
