//! Builders to construct engine components from configuration.

pub mod engine_builder;

pub use engine_builder::{build_engine, build_frame_loop, build_raster_buffer, build_scheduler, Engine};
