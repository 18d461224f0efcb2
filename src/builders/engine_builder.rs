//! Builders to construct engine components from configuration.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use crate::config::EngineConfig;
use crate::core::{
    AppResult, ComputeInterop, DeviceSelector, InteropRasterBuffer, RasterBackend, Scheduler,
    SchedulerError,
};
use crate::runtime::{FrameLoop, LogPump};

/// Scheduler, log pump and frame loop wired from one configuration.
#[derive(Debug)]
pub struct Engine {
    /// Running scheduler.
    pub scheduler: Scheduler,
    /// Background log pump.
    pub log_pump: LogPump,
    /// Frame driver.
    pub frame_loop: FrameLoop,
}

impl Engine {
    /// Stop the scheduler after writing any queued log lines.
    pub fn shutdown(self) -> AppResult<()> {
        self.scheduler.terminate().context("terminating scheduler")?;
        self.log_pump.flush();
        Ok(())
    }
}

/// Validate `cfg` and start a scheduler from its scheduler section.
pub fn build_scheduler(cfg: &EngineConfig) -> Result<Scheduler, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
    Scheduler::new(cfg.scheduler.clone())
}

/// Create an interop buffer on the best device, checking the raster backend
/// matches the configured API.
pub fn build_raster_buffer<T, R, C>(
    scheduler: &Scheduler,
    cfg: &EngineConfig,
    raster: Arc<R>,
    compute: Arc<C>,
    selector: &impl DeviceSelector,
) -> AppResult<InteropRasterBuffer<T, R, C>>
where
    R: RasterBackend,
    C: ComputeInterop,
{
    if raster.api() != cfg.interop.raster_api {
        bail!(
            "raster backend drives {:?} but configuration expects {:?}",
            raster.api(),
            cfg.interop.raster_api
        );
    }
    InteropRasterBuffer::on_best_device(
        scheduler.clone(),
        raster,
        compute,
        selector,
        cfg.interop.register_flags,
    )
    .context("selecting compute device")
}

/// Frame loop stepping the configured delta time.
#[must_use]
pub fn build_frame_loop(scheduler: &Scheduler, cfg: &EngineConfig) -> FrameLoop {
    FrameLoop::new(scheduler.clone(), cfg)
}

/// Start every engine service, logging into `log_sink`.
pub fn build_engine(cfg: &EngineConfig, log_sink: impl Write + Send + 'static) -> AppResult<Engine> {
    let scheduler = build_scheduler(cfg).context("starting scheduler")?;
    let log_pump = LogPump::start(&scheduler, log_sink).context("starting log pump")?;
    let frame_loop = build_frame_loop(&scheduler, cfg);
    info!(
        workers = scheduler.worker_count(),
        delta_time = cfg.delta_time_secs,
        "Engine services started"
    );
    Ok(Engine {
        scheduler,
        log_pump,
        frame_loop,
    })
}
