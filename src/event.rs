//! Classification of raw host events into the three categories the capture
//! engine cares about: call-like, return-like, and task-switch.

use std::sync::Arc;

/// Opaque identifier for the task the host was running when the event fired.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub u64);

/// The tag a host reports for a single event. Mirrors the event kinds a
/// tracing VM typically exposes (method/C-function/block entry and exit,
/// GC phase boundaries, line events) plus the scheduler's own task-switch
/// notification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RawEventKind {
    Call,
    CCall,
    BlockCall,
    Return,
    CReturn,
    BlockReturn,
    GcStart,
    GcEndSweep,
    Line,
    TaskSwitch,
    Unknown,
}

impl RawEventKind {
    /// Fixed human-readable name used only for reporting, never for control flow.
    pub fn name(self) -> &'static str {
        match self {
            RawEventKind::Call => "call",
            RawEventKind::CCall => "c-call",
            RawEventKind::BlockCall => "block-call",
            RawEventKind::Return => "return",
            RawEventKind::CReturn => "c-return",
            RawEventKind::BlockReturn => "block-return",
            RawEventKind::GcStart => "gc-start",
            RawEventKind::GcEndSweep => "gc-end-sweep",
            RawEventKind::Line => "line",
            RawEventKind::TaskSwitch => "task-switch",
            RawEventKind::Unknown => "unknown",
        }
    }

    /// Entry into a method, block, C function, or the start of a GC phase.
    pub fn is_call_like(self) -> bool {
        matches!(
            self,
            RawEventKind::Call
                | RawEventKind::CCall
                | RawEventKind::BlockCall
                | RawEventKind::GcStart
        )
    }

    /// The exit corresponding to one of the call-like kinds.
    pub fn is_return_like(self) -> bool {
        matches!(
            self,
            RawEventKind::Return
                | RawEventKind::CReturn
                | RawEventKind::BlockReturn
                | RawEventKind::GcEndSweep
        )
    }

    pub fn is_task_switch(self) -> bool {
        matches!(self, RawEventKind::TaskSwitch)
    }

    /// Neither call-like, return-like, nor a task-switch (e.g. line events).
    /// Recorded as a pseudo-frame only when call tracking is enabled.
    pub fn is_other(self) -> bool {
        !self.is_call_like() && !self.is_return_like() && !self.is_task_switch()
    }
}

/// A single notification delivered by the host's event-hook mechanism.
///
/// Source strings are borrowed from the host for the duration of the
/// callback only; the capture engine copies what it needs (see
/// [`crate::arena::Frame`]) before returning.
#[derive(Clone, Copy, Debug)]
pub struct RawEvent<'a> {
    pub kind: RawEventKind,
    /// Opaque identifier of the called method, reported as a string —
    /// this crate never inspects or hashes it.
    pub method_id: Option<&'a str>,
    pub class_name: Option<&'a str>,
    pub path: Option<&'a str>,
    pub line: u32,
    pub task: TaskId,
    pub task_is_blocking: bool,
}

/// Owned variant of [`RawEvent`], for a `Host` implementation that must
/// queue or buffer an event past the lifetime of the callback that
/// produced it.
#[derive(Clone, Debug)]
pub struct OwnedEvent {
    pub kind: RawEventKind,
    pub method_id: Option<Arc<str>>,
    pub class_name: Option<Arc<str>>,
    pub path: Option<Arc<str>>,
    pub line: u32,
    pub task: TaskId,
    pub task_is_blocking: bool,
}

impl OwnedEvent {
    pub fn as_raw(&self) -> RawEvent<'_> {
        RawEvent {
            kind: self.kind,
            method_id: self.method_id.as_deref(),
            class_name: self.class_name.as_deref(),
            path: self.path.as_deref(),
            line: self.line,
            task: self.task,
            task_is_blocking: self.task_is_blocking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_call_and_return_pairs() {
        assert!(RawEventKind::Call.is_call_like());
        assert!(RawEventKind::CCall.is_call_like());
        assert!(RawEventKind::BlockCall.is_call_like());
        assert!(RawEventKind::GcStart.is_call_like());

        assert!(RawEventKind::Return.is_return_like());
        assert!(RawEventKind::CReturn.is_return_like());
        assert!(RawEventKind::BlockReturn.is_return_like());
        assert!(RawEventKind::GcEndSweep.is_return_like());

        assert!(RawEventKind::TaskSwitch.is_task_switch());
    }

    #[test]
    fn line_events_are_other() {
        assert!(RawEventKind::Line.is_other());
        assert!(!RawEventKind::Line.is_call_like());
        assert!(!RawEventKind::Line.is_return_like());
        assert!(!RawEventKind::Line.is_task_switch());
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(RawEventKind::GcStart.name(), "gc-start");
        assert_eq!(RawEventKind::GcEndSweep.name(), "gc-end-sweep");
    }
}
