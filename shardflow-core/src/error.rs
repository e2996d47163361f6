use thiserror::Error;

/// Canonical error taxonomy of the execution core.
///
/// Classification guidance:
/// - [`Error::NoOutput`]: not a failure — a partitioner's signal that a row
///   has no downstream destination and must be dropped silently
/// - [`Error::Setup`]: stage deserialisation or `setup` failed before any
///   input was consumed
/// - [`Error::Transform`]: `apply` or `teardown` returned an error; partial
///   output may already be downstream
/// - [`Error::Flush`]: the output writer failed to flush or close; some rows
///   may be unacknowledged
/// - [`Error::Report`]: the success report failed after the task itself
///   succeeded, which fails the task from the system's point of view
/// - [`Error::Panic`]: an unrecovered panic inside the executor, captured by
///   the scoped recovery
///
/// Variants carry string payloads so the whole enum stays `Clone`, letting
/// the output writer cache its close outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The row has no destination partition. Dropped, never reported.
    #[error("no output")]
    NoOutput,

    /// A partitioner was asked to route into zero downstream partitions.
    #[error("invalid fan-out: {0}")]
    InvalidFanOut(usize),

    /// Stage deserialisation or `setup` failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// `apply` or `teardown` of the user transformation failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Flushing or closing the task output failed.
    #[error("output flush failed: {0}")]
    Flush(String),

    /// Reporting the task outcome failed.
    #[error("report failed: {0}")]
    Report(String),

    /// A panic escaped the user transformation.
    #[error("task panicked: {0}")]
    Panic(String),

    /// The task context was cancelled.
    #[error("task cancelled")]
    Cancelled,

    /// A wire payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The partitioner wire envelope carried an unregistered tag.
    #[error("unknown partitioner tag: {0}")]
    UnknownPartitioner(String),

    /// A stage descriptor referenced an unregistered runner.
    #[error("unknown stage runner: {0}")]
    UnknownRunner(String),

    /// A broadcast lookup found no entry under the given key.
    #[error("missing broadcast entry: {0}")]
    MissingBroadcast(String),

    /// A shuffle endpoint rejected a send or close.
    #[error("transport failed: {0}")]
    Transport(String),
}

impl Error {
    /// True for the drop-this-row sentinel, which the output writer handles
    /// without surfacing an error.
    pub fn is_no_output(&self) -> bool {
        matches!(self, Error::NoOutput)
    }
}

/// Standard result alias of the execution core.
pub type Result<T> = std::result::Result<T, Error>;
