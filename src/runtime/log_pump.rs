//! Background log pump.
//!
//! Log lines are sent over a `crossbeam_channel` and written to a sink by a
//! LOW-priority detached task that polls while the scheduler is running. It
//! defers to ready work between polls and parks like an idle worker when
//! there is none, so the hosting worker keeps its throughput. Without worker threads the pump does not spawn and
//! lines are written only by [`LogPump::flush`].

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::{Priority, Scheduler, SchedulerError};

struct PumpState {
    receiver: Receiver<String>,
    sink: Mutex<Box<dyn Write + Send>>,
    written: AtomicU64,
    failed: AtomicU64,
}

impl PumpState {
    fn write_line(&self, sink: &mut dyn Write, line: &str) {
        if sink.write_all(line.as_bytes()).is_ok() {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Write every queued line. Returns how many were taken off the channel.
    fn drain(&self) -> usize {
        let mut sink = self.sink.lock();
        let mut count = 0;
        for line in self.receiver.try_iter() {
            self.write_line(sink.as_mut(), &line);
            count += 1;
        }
        if count > 0 {
            let _ = sink.flush();
        }
        count
    }
}

/// Channel-fed log writer driven by the scheduler.
pub struct LogPump {
    sender: Sender<String>,
    state: Arc<PumpState>,
    detached: bool,
}

impl LogPump {
    /// Start pumping lines into `sink`.
    pub fn start(scheduler: &Scheduler, sink: impl Write + Send + 'static) -> Result<Self, SchedulerError> {
        let (sender, receiver) = unbounded();
        let state = Arc::new(PumpState {
            receiver,
            sink: Mutex::new(Box::new(sink)),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let detached = scheduler.worker_count() > 0;
        if detached {
            let pump = Arc::clone(&state);
            let sched = scheduler.clone();
            let idle = scheduler.config().park_timeout();
            scheduler.spawn_detached(Priority::Low, move || {
                while sched.running() {
                    pump.drain();
                    if sched.wait_for_work(idle) {
                        sched.defer();
                    }
                }
                pump.drain();
            })?;
            debug!("Log pump started");
        } else {
            debug!("No worker threads, log pump runs on flush only");
        }

        Ok(Self {
            sender,
            state,
            detached,
        })
    }

    /// Start pumping lines into standard output.
    pub fn stdout(scheduler: &Scheduler) -> Result<Self, SchedulerError> {
        Self::start(scheduler, io::stdout())
    }

    /// Queue one line; a trailing newline is added when missing.
    pub fn log(&self, line: impl Into<String>) {
        let mut line = line.into();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(line);
    }

    /// Write everything queued so far on the calling thread.
    pub fn flush(&self) -> usize {
        self.state.drain()
    }

    /// Whether a detached task is pumping.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }

    /// Lines written to the sink.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.state.written.load(Ordering::Relaxed)
    }

    /// Lines the sink rejected.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::Relaxed)
    }

    /// Lines queued and not yet written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// A `tracing_subscriber` writer feeding this pump.
    #[must_use]
    pub fn make_writer(&self) -> LogWriter {
        LogWriter {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for LogPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogPump")
            .field("detached", &self.detached)
            .field("pending", &self.pending())
            .field("written", &self.written())
            .finish_non_exhaustive()
    }
}

/// `io::Write` / `MakeWriter` adapter that queues formatted output on a pump.
#[derive(Debug, Clone)]
pub struct LogWriter {
    sender: Sender<String>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(String::from_utf8_lossy(buf).into_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log pump closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
