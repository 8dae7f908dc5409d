//! The abstract boundary between the capture engine and whatever host
//! runtime emits call/return/task-switch/GC-phase events.
//!
//! This crate does not implement tracing itself: a real
//! integration implements [`Host`] against its own VM hooks and pushes
//! events into [`crate::capture::Capture::on_event`] as they arrive. The
//! engine only needs [`Host`] to install and uninstall its subscriptions at
//! the right times.

use thiserror::Error;

/// Which event kinds a subscription should deliver.
///
/// The engine never asks for all kinds in one subscription: call/return
/// events and GC-phase events are requested as two independent groups (see
/// [`HookGroup`]) because some hosts disallow registering "internal" GC
/// hooks alongside user-space call/return hooks.
#[derive(Clone, Copy, Default, Debug)]
pub struct EventMask {
    pub call: bool,
    pub c_call: bool,
    pub block_call: bool,
    pub return_: bool,
    pub c_return: bool,
    pub block_return: bool,
    pub gc_start: bool,
    pub gc_end_sweep: bool,
    pub line: bool,
    pub task_switch: bool,
}

impl EventMask {
    pub const fn call_return() -> Self {
        Self {
            call: true,
            c_call: true,
            block_call: true,
            return_: true,
            c_return: true,
            block_return: true,
            gc_start: false,
            gc_end_sweep: false,
            line: true,
            task_switch: false,
        }
    }

    pub const fn gc() -> Self {
        Self {
            call: false,
            c_call: false,
            block_call: false,
            return_: false,
            c_return: false,
            block_return: false,
            gc_start: true,
            gc_end_sweep: true,
            line: false,
            task_switch: false,
        }
    }

    pub const fn task_switch() -> Self {
        Self {
            call: false,
            c_call: false,
            block_call: false,
            return_: false,
            c_return: false,
            block_return: false,
            gc_start: false,
            gc_end_sweep: false,
            line: false,
            task_switch: true,
        }
    }
}

/// Which independent subscription a mask belongs to.
///
/// The capture engine registers [`HookGroup::TaskSwitch`] once, for the
/// lifetime of a running capture, and toggles [`HookGroup::CallReturn`] /
/// [`HookGroup::Gc`] on and off as it pauses and resumes between intervals
/// (see spec §4.3's "Why two hook-install strategies").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HookGroup {
    CallReturn,
    Gc,
    TaskSwitch,
}

/// Opaque handle returned by a successful [`Host::register_event_hook`],
/// presented back on [`Host::unregister_event_hook`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HookToken(pub u64);

#[derive(Error, Debug)]
pub enum HostError {
    #[error("host rejected event mask for {0:?}")]
    UnsupportedMask(HookGroup),
    #[error("unknown hook token")]
    UnknownToken,
}

/// Installs and removes event-hook subscriptions on the calling OS thread.
///
/// Implementations are expected to dispatch each matching event to the
/// capture that registered for it by calling
/// [`crate::capture::Capture::on_event`]; this trait only covers
/// registration bookkeeping, not delivery.
pub trait Host {
    fn register_event_hook(&self, group: HookGroup, mask: EventMask) -> Result<HookToken, HostError>;
    fn unregister_event_hook(&self, token: HookToken) -> Result<(), HostError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::Cell;

    /// Minimal [`Host`] that always succeeds, for driving the engine
    /// directly in unit tests without a real VM underneath it.
    #[derive(Default)]
    pub struct NullHost {
        next_token: Cell<u64>,
    }

    impl Host for NullHost {
        fn register_event_hook(
            &self,
            _group: HookGroup,
            _mask: EventMask,
        ) -> Result<HookToken, HostError> {
            let token = self.next_token.get();
            self.next_token.set(token + 1);
            Ok(HookToken(token))
        }

        fn unregister_event_hook(&self, _token: HookToken) -> Result<(), HostError> {
            Ok(())
        }
    }
}
