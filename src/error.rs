use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to probe pipe {}: {source}", .path.display())]
    PipeProbe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to create pipe {}: {source}", .path.display())]
    PipeCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to open pipe {}: {source}", .path.display())]
    PipeOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stats record serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unable to write to pipe: {0}")]
    Write(#[source] std::io::Error),
    #[error("collector `{0}` is already running")]
    AlreadyStarted(String),
    #[error("collector `{0}` has been destroyed")]
    CollectorClosed(String),
    #[error("stats queue full")]
    QueueFull,
    #[error("timed out waiting for stats queue capacity")]
    EnqueueTimeout,
    #[error("stats record requires a non-empty component name")]
    EmptyComponentName,
    #[error("invalid pipe path: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("unable to spawn stats dumper: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("stats dumper for `{0}` panicked")]
    DumperPanicked(String),
}

impl Error {
    /// Caller lifecycle bugs, as opposed to I/O or capacity conditions.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Error::AlreadyStarted(_) | Error::CollectorClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
