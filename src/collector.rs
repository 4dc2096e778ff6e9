//! Producer-facing stats collector.
//!
//! # Lifecycle
//!
//! ```text
//!  new() ──► Idle ──init()──► Running ──destroy()──► Closed
//!             │                                        ▲
//!             └───────────────destroy()────────────────┘
//! ```
//!
//! Messages may be added while `Idle` or `Running`; they are buffered in a
//! bounded queue and written by a single dumper thread once `init` has run.
//! `destroy` closes the queue to producers and waits until the dumper has
//! written everything accepted before the close.
//!
//! # Example
//!
//! ```no_run
//! use stats_pipe::{StatsCollector, StatsPipe};
//!
//! let pipe = StatsPipe::at("/tmp/monitorPipe");
//! let collector = StatsCollector::new("network", pipe);
//! collector.init()?;
//! collector.emit("read", "f1", [("bytes", "100")])?;
//! collector.emit("write", "f1", [("bytes", "50")])?;
//! let report = collector.destroy()?;
//! assert_eq!(report.written, 2);
//! # Ok::<(), stats_pipe::Error>(())
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use log::{error, warn};

use crate::config::CollectorConfig;
use crate::dumper::{Dumper, DumperReport};
use crate::pipe::StatsPipe;
use crate::queue::{BoundedQueue, PushError};
use crate::stats::{StatsMessage, StatsRecord};
use crate::{Error, Result};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

pub struct StatsCollector {
    component_name: String,
    config: CollectorConfig,
    queue: Arc<BoundedQueue<StatsMessage>>,
    pipe: Arc<StatsPipe>,
    state: AtomicU8,
    worker: Mutex<Option<JoinHandle<DumperReport>>>,
}

impl StatsCollector {
    /// Creates an idle collector. No thread is started and no I/O is done.
    pub fn new(component_name: impl Into<String>, pipe: Arc<StatsPipe>) -> Self {
        Self::with_config(component_name, pipe, CollectorConfig::default())
    }

    pub fn with_config(
        component_name: impl Into<String>,
        pipe: Arc<StatsPipe>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            queue: Arc::new(BoundedQueue::new(config.capacity)),
            config,
            pipe,
            state: AtomicU8::new(IDLE),
            worker: Mutex::new(None),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn pipe(&self) -> &Arc<StatsPipe> {
        &self.pipe
    }

    /// Messages accepted but not yet taken by the dumper.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Starts the dumper thread.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyStarted` if the dumper is already running,
    /// `Error::CollectorClosed` after `destroy`.
    pub fn init(&self) -> Result<()> {
        // Held across the transition so destroy() always finds the handle of
        // a dumper that was started.
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => {
                error!("stats collector [{}]: init called twice", self.component_name);
                return Err(Error::AlreadyStarted(self.component_name.clone()));
            }
            Err(_) => return Err(self.misuse("init after destroy")),
        }

        let dumper = Dumper::new(
            self.component_name.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.pipe),
        );
        match dumper.spawn() {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.abandon_start();
                Err(Error::Spawn(err))
            }
        }
    }

    /// Queues a message for the dumper.
    ///
    /// With the default policy this blocks for as long as the queue is full.
    ///
    /// # Errors
    ///
    /// `Error::CollectorClosed` once `destroy` has been called. With an
    /// opt-in backpressure policy, `Error::QueueFull` or
    /// `Error::EnqueueTimeout`.
    pub fn add_stats(&self, message: StatsMessage) -> Result<()> {
        match self.queue.push(message, self.config.backpressure) {
            Ok(()) => Ok(()),
            Err(PushError::Closed(_)) => Err(self.misuse("add_stats after destroy")),
            Err(PushError::Full(_)) => Err(Error::QueueFull),
            Err(PushError::Timeout(_)) => Err(Error::EnqueueTimeout),
        }
    }

    /// Queues an event tagged with this collector's component name.
    pub fn emit<I, K, V>(&self, operation: &str, blob: &str, value: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let record = StatsRecord::new(self.component_name.as_str(), operation, blob, value)?;
        self.add_stats(StatsMessage::Event(record))
    }

    /// Queues an accumulate message; see [`StatsMessage::Accumulate`].
    pub fn accumulate<I, K, V>(&self, operation: &str, blob: &str, value: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let record = StatsRecord::new(self.component_name.as_str(), operation, blob, value)?;
        self.add_stats(StatsMessage::Accumulate(record))
    }

    /// Stops accepting messages and waits for the dumper to drain the queue.
    ///
    /// A collector that was never started has no dumper; its buffered
    /// messages are dropped and counted as discarded.
    ///
    /// # Errors
    ///
    /// `Error::CollectorClosed` on a second call, `Error::DumperPanicked` if
    /// the dumper thread died.
    pub fn destroy(&self) -> Result<DumperReport> {
        if self.state.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return Err(self.misuse("destroy called twice"));
        }
        self.queue.close();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::DumperPanicked(self.component_name.clone())),
            None => {
                let dropped = self.queue.clear();
                if dropped > 0 {
                    warn!(
                        "stats collector [{}]: destroyed before init, dropping {} messages",
                        self.component_name, dropped
                    );
                }
                Ok(DumperReport {
                    discarded: dropped as u64,
                    ..DumperReport::default()
                })
            }
        }
    }

    /// Backs out of a failed `init`. A concurrent `destroy` may already have
    /// moved the state to `CLOSED`, which must stay.
    fn abandon_start(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    fn misuse(&self, what: &str) -> Error {
        error!("stats collector [{}]: {}", self.component_name, what);
        Error::CollectorClosed(self.component_name.clone())
    }
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        if *self.state.get_mut() == CLOSED {
            return;
        }
        if let Err(err) = self.destroy() {
            error!("stats collector [{}]: {}", self.component_name, err);
        }
    }
}
