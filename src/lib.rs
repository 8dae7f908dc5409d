//! Detects cooperative tasks that monopolize a single-threaded scheduler
//! ("stalls") and, when one occurs, emits a structured report of the call
//! stack that caused it.
//!
//! This crate targets programs built on user-space cooperative tasks
//! (green threads / fibers / coroutines) that share one OS thread and
//! yield explicitly at known points: any task that runs longer than a
//! configured wall-clock budget between two such yields is a stall.
//!
//! The core is the capture engine (see [`capture::Capture`]): it observes
//! task-switch and call/return events pushed in by a host integration (see
//! [`host::Host`]), maintains an in-memory tree of call frames between two
//! consecutive yield points, decides whether the interval was a stall,
//! filters inconsequential frames, and renders a report through a
//! [`sink::Sink`].
//!
//! This crate does not implement tracing itself: integrating with a real
//! host runtime means implementing [`host::Host`] against that runtime's
//! own event-hook mechanism and calling [`Profiler::on_event`] as events
//! arrive.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::time::Duration;
//!
//! use fiber_stall_profiler::config::Config;
//! use fiber_stall_profiler::event::{RawEvent, RawEventKind, TaskId};
//! use fiber_stall_profiler::host::{EventMask, Host, HookGroup, HookToken, HostError};
//! use fiber_stall_profiler::sink::BufferSink;
//! use fiber_stall_profiler::Profiler;
//!
//! #[derive(Default)]
//! struct NoopHost(Cell<u64>);
//!
//! impl Host for NoopHost {
//!     fn register_event_hook(&self, _group: HookGroup, _mask: EventMask) -> Result<HookToken, HostError> {
//!         let token = self.0.get();
//!         self.0.set(token + 1);
//!         Ok(HookToken(token))
//!     }
//!     fn unregister_event_hook(&self, _token: HookToken) -> Result<(), HostError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = Config::builder()
//!     .stall_threshold(Duration::from_micros(100))
//!     .build();
//!
//! let profiler = Profiler::with_sink(config, Box::new(NoopHost::default()), Box::new(BufferSink::default()));
//! profiler.start();
//!
//! let task = TaskId(0);
//! let switch = RawEvent { kind: RawEventKind::TaskSwitch, method_id: None, class_name: None, path: None, line: 0, task, task_is_blocking: false };
//! profiler.on_event(switch);
//! profiler.on_event(RawEvent { kind: RawEventKind::Call, method_id: Some("sleep"), class_name: Some("Kernel"), path: Some("app.rb"), line: 3, task, task_is_blocking: false });
//! profiler.on_event(RawEvent { kind: RawEventKind::Return, method_id: None, class_name: None, path: None, line: 0, task, task_is_blocking: false });
//! profiler.on_event(switch);
//!
//! println!("stalls observed: {}", profiler.stalls());
//! profiler.stop();
//! ```

pub mod arena;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod fork;
pub mod host;
pub mod render;
pub mod sampler;
pub mod sink;

use std::cell::RefCell;
use std::rc::Rc;

use config::Config;
use event::RawEvent;
use host::Host;
use sink::{Sink, StderrSink};

/// Public facade: a handle to one thread's capture, plus the env-driven
/// construction convenience spec §6 describes.
///
/// `Profiler` is effectively `!Send`/`!Sync` (it wraps `Rc<RefCell<_>>` so
/// [`fork::register`] can hold a weak reference for the fork-awareness
/// hook), matching spec §5's "meaningful only for the thread that calls
/// it".
pub struct Profiler {
    inner: Rc<RefCell<capture::Capture>>,
}

impl Profiler {
    /// Builds an idle profiler with an explicit configuration, host, and
    /// sink.
    pub fn with_sink(config: Config, host: Box<dyn Host>, sink: Box<dyn Sink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(capture::Capture::new(config, host, sink))),
        }
    }

    /// Builds an idle profiler with an explicit configuration, writing
    /// reports to stderr (spec §6's default sink).
    pub fn with_config(config: Config, host: Box<dyn Host>) -> Self {
        Self::with_sink(config, host, Box::new(StderrSink::default()))
    }

    /// Reads [`Config::from_env`] and, if `FIBER_PROFILER_CAPTURE` is
    /// truthy, immediately starts the capture (spec §6: "gates whether
    /// `default()` returns a live capture"). Otherwise returns an idle
    /// profiler the caller may still `start()` explicitly.
    pub fn from_env(host: Box<dyn Host>) -> Self {
        let profiler = Self::with_config(Config::from_env(), host);
        if config::capture_enabled() {
            profiler.start();
        }
        profiler
    }

    /// Installs hooks and marks the capture running. Returns `false` if
    /// already running.
    pub fn start(&self) -> bool {
        let started = self.inner.borrow_mut().start();
        if started {
            fork::register(&self.inner);
        }
        started
    }

    /// Uninstalls hooks and discards any in-flight interval. Returns
    /// `false` if already idle.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.borrow_mut().stop();
        if stopped {
            fork::clear();
        }
        stopped
    }

    /// Feeds one host event into the engine.
    pub fn on_event(&self, event: RawEvent<'_>) {
        self.inner.borrow_mut().on_event(event);
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().is_running()
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.borrow().is_capturing()
    }

    pub fn switches(&self) -> usize {
        self.inner.borrow().switches()
    }

    pub fn samples(&self) -> usize {
        self.inner.borrow().samples()
    }

    pub fn stalls(&self) -> usize {
        self.inner.borrow().stalls()
    }

    pub fn frame_arena_memory_size(&self) -> usize {
        self.inner.borrow().frame_arena_memory_size()
    }

    pub fn config(&self) -> Config {
        self.inner.borrow().config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RawEventKind, TaskId};
    use crate::host::test_support::NullHost;
    use crate::sink::BufferSink;
    use std::time::Duration;

    fn task_switch() -> RawEvent<'static> {
        RawEvent {
            kind: RawEventKind::TaskSwitch,
            method_id: None,
            class_name: None,
            path: None,
            line: 0,
            task: TaskId(0),
            task_is_blocking: false,
        }
    }

    #[test]
    fn round_trip_one_stall_is_counted() {
        let config = Config::builder()
            .stall_threshold(Duration::from_nanos(1))
            .build();
        let sink = Box::new(BufferSink::default());
        let profiler = Profiler::with_sink(config, Box::new(NullHost::default()), sink);

        profiler.start();
        profiler.on_event(task_switch());
        std::thread::sleep(Duration::from_micros(50));
        profiler.on_event(task_switch());
        assert!(profiler.stop());

        assert_eq!(profiler.stalls(), 1);
    }

    #[test]
    fn idempotent_stop() {
        let profiler = Profiler::with_config(Config::default(), Box::new(NullHost::default()));
        profiler.start();
        assert!(profiler.stop());
        assert!(!profiler.stop());
    }

    #[test]
    fn from_env_is_idle_when_capture_not_enabled() {
        std::env::remove_var("FIBER_PROFILER_CAPTURE");
        let profiler = Profiler::from_env(Box::new(NullHost::default()));
        assert!(!profiler.is_running());
    }
}
