//! Contained failure modes of the capture engine. None of these ever
//! escape an event callback: each is caught at its origin, logged at most
//! once, and the engine falls back to a safe state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// Frame arena push or page allocation failed. Fatal to the current
    /// interval only: the engine pauses, truncates the arena, and the next
    /// task-switch may begin a fresh one.
    #[error("frame arena allocation failed")]
    AllocationFailure,

    /// A return-like event arrived with no open frame and no prior frames
    /// at all (profiling began mid-frame). Recovered by synthesizing a
    /// frame anchored at the interval's `switch_time`.
    #[error("event stream is malformed: {0}")]
    MalformedEventStream(&'static str),

    /// The output sink rejected a write. The report is lost; the engine
    /// continues.
    #[error("failed to write report to sink: {0}")]
    SinkWriteFailure(#[source] std::io::Error),

    /// `start` while running, or `stop` while idle.
    #[error("capture misuse: {0}")]
    Misuse(&'static str),
}
