//! Pipe and collector configuration.
//!
//! Both structs deserialize with field defaults, so a host can embed them in
//! its own configuration file and only override what it needs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name of the pipe under the default directory.
pub const DEFAULT_PIPE_NAME: &str = "monitorPipe";
pub const DEFAULT_PIPE_MODE: u32 = 0o666;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Where the named pipe lives and how it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Filesystem path of the FIFO.
    /// Default: `<temp dir>/monitorPipe`
    pub path: PathBuf,

    /// Permission bits passed to `mkfifo` (subject to the process umask).
    /// Default: 0o666
    pub mode: u32,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join(DEFAULT_PIPE_NAME),
            mode: DEFAULT_PIPE_MODE,
        }
    }
}

impl PipeConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// What `add_stats` does when the collector's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackpressurePolicy {
    /// Wait for the dumper to free a slot. `None` waits forever; a producer
    /// can then stall if nothing ever reads the other end of the pipe.
    /// Setting a timeout turns that stall into `Error::EnqueueTimeout`.
    Block { timeout: Option<Duration> },
    /// Return `Error::QueueFull` immediately.
    FailFast,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        BackpressurePolicy::Block { timeout: None }
    }
}

/// Per-collector settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Number of messages buffered between producers and the dumper.
    /// Default: 100,000
    pub capacity: usize,

    /// Behaviour of producers against a full queue.
    /// Default: block without timeout
    pub backpressure: BackpressurePolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressurePolicy::default(),
        }
    }
}

impl CollectorConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn blocking(timeout: Option<Duration>) -> Self {
        Self {
            backpressure: BackpressurePolicy::Block { timeout },
            ..Self::default()
        }
    }
}
