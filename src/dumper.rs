//! The per-collector consumer thread.
//!
//! A dumper owns nothing but its pipe handle: it pops messages in order,
//! writes events as JSON lines and exits once its queue is closed and empty.
//! Pipe and write failures are logged here and go no further.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::pipe::{PipeWriter, StatsPipe};
use crate::queue::BoundedQueue;
use crate::stats::{StatsMessage, StatsRecord};
use crate::Result;

/// What a dumper did over its lifetime, returned when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumperReport {
    /// Event lines written to the pipe.
    pub written: u64,
    /// Events dropped because they could not be encoded.
    pub encode_failures: u64,
    /// Events whose write to the pipe failed.
    pub write_failures: u64,
    /// `Accumulate` messages consumed without output.
    pub accumulated: u64,
    /// Messages drained with no pipe to write them to.
    pub discarded: u64,
}

impl DumperReport {
    /// Messages taken off the queue, whatever became of them.
    pub fn consumed(&self) -> u64 {
        self.written + self.encode_failures + self.write_failures + self.accumulated + self.discarded
    }
}

pub(crate) struct Dumper {
    component: String,
    queue: Arc<BoundedQueue<StatsMessage>>,
    pipe: Arc<StatsPipe>,
}

impl Dumper {
    pub(crate) fn new(
        component: String,
        queue: Arc<BoundedQueue<StatsMessage>>,
        pipe: Arc<StatsPipe>,
    ) -> Self {
        Self {
            component,
            queue,
            pipe,
        }
    }

    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<DumperReport>> {
        thread::Builder::new()
            .name(format!("stats-dumper-{}", self.component))
            .spawn(move || self.run())
    }

    fn run(self) -> DumperReport {
        let mut report = DumperReport::default();

        let mut writer = match self.open_pipe() {
            Ok(writer) => writer,
            Err(err) => {
                error!("stats dumper [{}]: {}", self.component, err);
                // No output for the rest of this collector's life, but keep
                // consuming so producers and destroy() never wait on us.
                while self.queue.pop().is_some() {
                    report.discarded += 1;
                }
                return report;
            }
        };
        info!(
            "stats dumper [{}]: opened pipe {}",
            self.component,
            self.pipe.path().display()
        );

        while let Some(message) = self.queue.pop() {
            debug!("stats dumper [{}]: {:?}", self.component, message);
            match message {
                StatsMessage::Event(record) => self.dump_event(&record, &mut writer, &mut report),
                StatsMessage::Accumulate(_) => {
                    // TODO: aggregate per-component totals once a consumer
                    // defines what an accumulated line looks like.
                    report.accumulated += 1;
                }
            }
        }

        info!("stats dumper [{}]: exiting {:?}", self.component, report);
        report
    }

    fn open_pipe(&self) -> Result<PipeWriter> {
        self.pipe.ensure_exists()?;
        self.pipe.open()
    }

    fn dump_event(&self, record: &StatsRecord, writer: &mut PipeWriter, report: &mut DumperReport) {
        let body = match record.to_json() {
            Ok(body) => body,
            Err(err) => {
                error!("stats dumper [{}]: {}", self.component, err);
                report.encode_failures += 1;
                return;
            }
        };
        match writer.write_line(&body) {
            Ok(()) => report.written += 1,
            Err(err) => {
                error!("stats dumper [{}]: {}", self.component, err);
                report.write_failures += 1;
            }
        }
    }
}
