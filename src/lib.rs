//! Ordered forwarding of operation stats to an external monitor over a
//! named pipe.
//!
//! Producers hand [`StatsMessage`]s to a [`StatsCollector`]; each collector
//! runs one dumper thread that writes events, in order, as newline-delimited
//! JSON to a shared [`StatsPipe`]. Unix only.

pub mod collector;
pub mod config;
mod dumper;
pub mod error;
pub mod pipe;
pub mod queue;
pub mod stats;

pub use collector::StatsCollector;
pub use config::{BackpressurePolicy, CollectorConfig, PipeConfig};
pub use dumper::DumperReport;
pub use error::{Error, Result};
pub use pipe::{PipeWriter, StatsPipe};
pub use queue::{BoundedQueue, PushError};
pub use stats::{StatsMessage, StatsRecord};
