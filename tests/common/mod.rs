#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use stats_pipe::{StatsPipe, StatsRecord};

/// Creates the pipe and attaches a non-blocking reader to it.
///
/// The reader keeps everything written until it is drained, and sees EOF once
/// every dumper has closed its handle.
pub fn pipe_with_reader(dir: &Path) -> (Arc<StatsPipe>, File) {
    let pipe = StatsPipe::at(dir.join("monitorPipe"));
    pipe.ensure_exists().expect("create pipe");
    let reader = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(pipe.path())
        .expect("open reader");
    (pipe, reader)
}

/// Reads to EOF. Call only after every collector on the pipe is destroyed.
pub fn read_lines(reader: &mut File) -> Vec<String> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents).expect("read pipe");
    assert!(
        contents.is_empty() || contents.ends_with('\n'),
        "trailing partial line: {contents:?}"
    );
    contents.lines().map(str::to_owned).collect()
}

pub fn parse_lines(lines: &[String]) -> Vec<StatsRecord> {
    lines
        .iter()
        .map(|line| StatsRecord::from_json(line.as_bytes()).expect("well-formed line"))
        .collect()
}

/// Reads `count` lines from the pipe on a background thread, so writers
/// never stall on a full pipe buffer.
///
/// The reader opens read-write: it neither waits for a writer to appear nor
/// sees EOF between collectors.
pub fn spawn_line_reader(path: &Path, count: usize) -> JoinHandle<Vec<String>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("open reader");
    thread::spawn(move || {
        BufReader::new(file)
            .lines()
            .take(count)
            .map(|line| line.expect("read pipe"))
            .collect()
    })
}
