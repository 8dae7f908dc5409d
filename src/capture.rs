//! The per-thread profiling state machine (spec §4.3): the hard core of
//! this crate. Owns the frame arena, decides whether an interval was a
//! stall, applies the filter rule, and drives the renderer.

use std::sync::Arc;

use crate::arena::{Arena, Frame, FrameHandle};
use crate::clock::{Clock, Timestamp};
use crate::config::Config;
use crate::error::CaptureError;
use crate::event::{RawEvent, RawEventKind};
use crate::host::{EventMask, Host, HookGroup, HookToken};
use crate::render::{self, Counters as RenderCounters};
use crate::sampler::Xorshift64;
use crate::sink::Sink;

/// Tracks which hooks are currently installed, collapsing spec's two
/// booleans (`running`, `capturing`) into one state with the same
/// invariant (`capturing ⇒ running`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Idle,
    Paused,
    Capturing,
}

#[derive(Default, Clone, Copy)]
struct Counters {
    switches: usize,
    samples: usize,
    stalls: usize,
}

/// Which independent hook subscriptions are currently installed, so `stop`
/// and the task-switch handler know exactly what to unregister.
#[derive(Default)]
struct Hooks {
    task_switch: Option<HookToken>,
    call_return: Option<HookToken>,
    gc: Option<HookToken>,
}

/// The capture engine for one OS thread.
///
/// `start`/`stop`/event delivery are only meaningful on the thread that
/// constructed and started the capture (spec §5); nothing here is `Sync`.
pub struct Capture {
    config: Config,
    host: Box<dyn Host>,
    sink: Box<dyn Sink>,
    clock: Clock,
    rng: Xorshift64,

    phase: Phase,
    hooks: Hooks,
    start_time: Option<Timestamp>,
    switch_time: Option<Timestamp>,
    nesting: i64,
    nesting_minimum: i64,
    current: Option<FrameHandle>,
    frames: Arena,
    counters: Counters,
    /// Intervals dropped to `AllocationFailure`; not part of the reported
    /// machine form (spec §7).
    dropped_intervals: u64,
}

impl Capture {
    pub fn new(config: Config, host: Box<dyn Host>, sink: Box<dyn Sink>) -> Self {
        Self::with_seed(config, host, sink, default_seed())
    }

    /// Construction with an explicit PRNG seed, for reproducible sampling
    /// in tests (spec §8's "Determinism under `sample_rate = 1`" and the
    /// seeded-RNG sampling scenario).
    pub fn with_seed(config: Config, host: Box<dyn Host>, sink: Box<dyn Sink>, seed: u64) -> Self {
        Self {
            config,
            host,
            sink,
            clock: Clock::new(),
            rng: Xorshift64::new(seed),
            phase: Phase::Idle,
            hooks: Hooks::default(),
            start_time: None,
            switch_time: None,
            nesting: 0,
            nesting_minimum: 0,
            current: None,
            frames: Arena::new(),
            counters: Counters::default(),
            dropped_intervals: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_capturing(&self) -> bool {
        self.phase == Phase::Capturing
    }

    pub fn switches(&self) -> usize {
        self.counters.switches
    }

    pub fn samples(&self) -> usize {
        self.counters.samples
    }

    pub fn stalls(&self) -> usize {
        self.counters.stalls
    }

    pub fn frame_arena_memory_size(&self) -> usize {
        self.frames.memory_size()
    }

    /// Installs hooks and marks the capture running. Returns `false` (no
    /// state change) if already running.
    pub fn start(&mut self) -> bool {
        if self.phase != Phase::Idle {
            log::warn!("{}", CaptureError::Misuse("start() called while already running"));
            return false;
        }
        match self
            .host
            .register_event_hook(HookGroup::TaskSwitch, EventMask::task_switch())
        {
            Ok(token) => self.hooks.task_switch = Some(token),
            Err(err) => {
                log::warn!("failed to install task-switch hook: {err}");
                return false;
            }
        }
        self.start_time = Some(self.clock.now());
        self.phase = Phase::Paused;
        true
    }

    /// Uninstalls hooks, discards any in-flight interval without
    /// rendering, and marks the capture idle. Idempotent: returns `false`
    /// on a capture that is already idle.
    pub fn stop(&mut self) -> bool {
        if self.phase == Phase::Idle {
            log::warn!("{}", CaptureError::Misuse("stop() called while already idle"));
            return false;
        }
        self.uninstall_call_return_hooks();
        if let Some(token) = self.hooks.task_switch.take() {
            let _ = self.host.unregister_event_hook(token);
        }
        self.frames.truncate();
        self.nesting = 0;
        self.nesting_minimum = 0;
        self.current = None;
        self.switch_time = None;
        self.phase = Phase::Idle;
        true
    }

    /// Clears all engine state without touching the host, for use from a
    /// forked child process where the parent's hook registrations are
    /// meaningless (see [`crate::fork`]).
    pub(crate) fn clear_after_fork(&mut self) {
        self.hooks = Hooks::default();
        self.frames.truncate();
        self.nesting = 0;
        self.nesting_minimum = 0;
        self.current = None;
        self.switch_time = None;
        self.phase = Phase::Idle;
    }

    /// Feeds one host event into the engine. Never panics or propagates an
    /// error out of this call (spec §7): every failure path is contained.
    pub fn on_event(&mut self, event: RawEvent<'_>) {
        if self.phase == Phase::Idle {
            return;
        }

        let now = self.clock.now();

        if event.kind.is_task_switch() {
            self.on_task_switch(now, &event);
            return;
        }

        if self.phase != Phase::Capturing || !self.config.track_calls {
            return;
        }

        if event.kind.is_call_like() {
            self.on_call_like(now, &event);
        } else if event.kind.is_return_like() {
            self.on_return_like(now, &event);
        } else {
            self.on_other(now, &event);
        }
    }

    fn on_task_switch(&mut self, now: Timestamp, event: &RawEvent<'_>) {
        self.counters.switches += 1;

        if self.phase == Phase::Capturing {
            let switch_time = self.switch_time.expect("capturing implies switch_time set");
            let interval_duration = now.since(switch_time);

            self.finalize_open_frames(now);
            self.uninstall_call_return_hooks();

            if interval_duration > self.config.stall_threshold.as_secs_f64() {
                self.counters.stalls += 1;
                self.render_stall(switch_time, interval_duration);
            }

            self.frames.truncate();
            self.nesting = 0;
            self.nesting_minimum = 0;
            self.current = None;
            self.phase = Phase::Paused;
        }

        if event.task_is_blocking {
            return;
        }

        let accept = self.config.sample_rate >= 1.0 || self.rng.next_unit() <= self.config.sample_rate;
        if accept {
            self.switch_time = Some(now);
            self.counters.samples += 1;
            self.install_call_return_hooks();
            self.phase = Phase::Capturing;
        }
    }

    fn install_call_return_hooks(&mut self) {
        if self.hooks.call_return.is_none() {
            match self
                .host
                .register_event_hook(HookGroup::CallReturn, EventMask::call_return())
            {
                Ok(token) => self.hooks.call_return = Some(token),
                Err(err) => log::warn!("failed to install call/return hooks: {err}"),
            }
        }
        if self.hooks.gc.is_none() {
            match self.host.register_event_hook(HookGroup::Gc, EventMask::gc()) {
                Ok(token) => self.hooks.gc = Some(token),
                Err(err) => log::warn!("failed to install gc hooks: {err}"),
            }
        }
    }

    fn uninstall_call_return_hooks(&mut self) {
        if let Some(token) = self.hooks.call_return.take() {
            let _ = self.host.unregister_event_hook(token);
        }
        if let Some(token) = self.hooks.gc.take() {
            let _ = self.host.unregister_event_hook(token);
        }
    }

    fn on_call_like(&mut self, now: Timestamp, event: &RawEvent<'_>) {
        let parent = self.current;
        let mut frame = Frame::new(now, self.nesting, event.kind);
        frame.parent = parent;
        frame.method_id = event.method_id.map(Arc::from);
        frame.class_name = event.class_name.map(Arc::from);
        frame.path = event.path.map(Arc::from);
        frame.line = event.line;

        match self.push_child(frame, parent) {
            Ok(handle) => {
                self.current = Some(handle);
                self.nesting += 1;
            }
            Err(err) => self.abort_interval(err),
        }
    }

    fn on_return_like(&mut self, now: Timestamp, event: &RawEvent<'_>) {
        if let Some(handle) = self.current {
            let enter_time = self.frames.get(handle).enter_time;
            self.frames.get_mut(handle).duration = Some(now.since(enter_time));
            self.current = self.frames.get(handle).parent;
            self.nesting -= 1;
            self.nesting_minimum = self.nesting_minimum.min(self.nesting);
            self.apply_filter(handle);
            return;
        }

        // Imbalance: a return-like event with no open frame. Synthesize one
        // anchored at the previous frame's start, or the interval's
        // switch_time if the arena is empty (spec §4.3 point 3, §8's
        // "Return with empty arena" boundary behavior).
        log::trace!(
            "{}",
            CaptureError::MalformedEventStream("return with no open frame")
        );
        let enter_time = match self.frames.last() {
            Some(last) => self.frames.get(last).enter_time,
            None => self
                .switch_time
                .expect("capturing implies switch_time set"),
        };

        let mut frame = Frame::new(enter_time, self.nesting, event.kind);
        frame.duration = Some(now.since(enter_time));
        frame.method_id = event.method_id.map(Arc::from);
        frame.class_name = event.class_name.map(Arc::from);
        frame.path = event.path.map(Arc::from);
        frame.line = event.line;

        if let Err(err) = self.push_child(frame, None) {
            self.abort_interval(err);
        }
    }

    fn on_other(&mut self, now: Timestamp, event: &RawEvent<'_>) {
        let parent = self.current;
        let enter_time = match self.frames.last() {
            Some(last) => self.frames.get(last).enter_time,
            None => self
                .switch_time
                .expect("capturing implies switch_time set"),
        };

        let mut frame = Frame::new(enter_time, self.nesting, event.kind);
        frame.duration = Some(now.since(enter_time));
        frame.parent = parent;
        frame.method_id = event.method_id.map(Arc::from);
        frame.class_name = event.class_name.map(Arc::from);
        frame.path = event.path.map(Arc::from);
        frame.line = event.line;

        if let Err(err) = self.push_child(frame, parent) {
            self.abort_interval(err);
        }
    }

    /// Pushes `frame` into the arena, bumping `parent`'s `children` count
    /// when present so the accounting invariant in spec §8 ("sum of
    /// `children` equals the number of frames with a non-null parent")
    /// holds for every frame kind, not just call-like ones.
    fn push_child(
        &mut self,
        frame: Frame,
        parent: Option<FrameHandle>,
    ) -> Result<FrameHandle, CaptureError> {
        let handle = self.frames.push(frame)?;
        if let Some(p) = parent {
            self.frames.get_mut(p).children += 1;
        }
        Ok(handle)
    }

    /// End-of-frame filter rule (spec §4.3): a call-like frame that is
    /// still the arena's tail and whose duration is below
    /// `filter_threshold` is elided.
    fn apply_filter(&mut self, handle: FrameHandle) {
        if self.frames.last() != Some(handle) {
            return;
        }
        let frame = self.frames.get(handle);
        if !frame.event_kind.is_call_like() {
            return;
        }
        let duration = frame.duration.unwrap_or(0.0);
        if duration >= self.config.filter_threshold.as_secs_f64() {
            return;
        }
        let parent = frame.parent;
        self.frames.pop();
        if let Some(p) = parent {
            let parent_frame = self.frames.get_mut(p);
            parent_frame.children = parent_frame.children.saturating_sub(1);
            parent_frame.filtered += 1;
        }
    }

    /// Finalizes every still-open frame on the `current` chain at interval
    /// end, applying the filter rule to each as it closes (spec §4.3's
    /// task-switch handling, step "For each open frame from `current` up
    /// through parents").
    fn finalize_open_frames(&mut self, now: Timestamp) {
        let mut handle = self.current;
        while let Some(h) = handle {
            let parent = self.frames.get(h).parent;
            let enter_time = self.frames.get(h).enter_time;
            self.frames.get_mut(h).duration = Some(now.since(enter_time));
            self.apply_filter(h);
            handle = parent;
        }
    }

    fn abort_interval(&mut self, err: CaptureError) {
        log::warn!("capture interval aborted: {err}");
        self.dropped_intervals += 1;
        self.uninstall_call_return_hooks();
        self.frames.truncate();
        self.nesting = 0;
        self.nesting_minimum = 0;
        self.current = None;
        self.phase = Phase::Paused;
    }

    fn render_stall(&mut self, switch_time: Timestamp, interval_duration: f64) {
        let start_time = self.start_time.expect("running implies start_time set");
        let rendered = render::build(
            &self.frames,
            self.nesting_minimum,
            start_time,
            switch_time,
            interval_duration,
            RenderCounters {
                switches: self.counters.switches,
                samples: self.counters.samples,
                stalls: self.counters.stalls,
            },
        );
        let bytes = if self.sink.is_tty() {
            render::tty::render(&rendered)
        } else {
            render::machine::render(&rendered)
        };
        if let Err(io_err) = self.sink.write_report(&bytes) {
            let err = CaptureError::SinkWriteFailure(io_err);
            log::warn!("{err}");
        }
    }
}

fn default_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x2545F4914F6CDD1D)
}
