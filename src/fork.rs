//! Fork awareness (spec §5, §9 "Thread-local active capture").
//!
//! After `fork(2)`, a child process inherits a [`crate::Profiler`] whose
//! hook registrations point at the parent's now-foreign bookkeeping. This
//! crate does not register a `pthread_atfork` handler itself — wiring that
//! up is the host's job (spec §1 lists fork-awareness as an external
//! collaborator) — but it tracks the active capture on the calling thread
//! so a fork observer has something to call.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::capture::Capture;

thread_local! {
    static ACTIVE: RefCell<Option<Weak<RefCell<Capture>>>> = const { RefCell::new(None) };
}

/// Registers `capture` as the active capture for the calling thread.
/// Called by [`crate::Profiler::start`].
pub(crate) fn register(capture: &Rc<RefCell<Capture>>) {
    ACTIVE.with(|slot| *slot.borrow_mut() = Some(Rc::downgrade(capture)));
}

/// Clears the calling thread's active-capture slot. Called by
/// [`crate::Profiler::stop`].
pub(crate) fn clear() {
    ACTIVE.with(|slot| *slot.borrow_mut() = None);
}

/// Forcibly tears down the calling thread's active capture, if any.
///
/// A fork observer calls this in the child process right after `fork(2)`
/// returns there. It is safe to call even when no capture is active, or
/// when the capture was already stopped (spec §8's "Fork pause" scenario:
/// "in child: the engine's active state is cleared and `stop` returns
/// false").
pub fn notify_forked_child() {
    let weak = ACTIVE.with(|slot| slot.borrow_mut().take());
    if let Some(weak) = weak {
        if let Some(capture) = weak.upgrade() {
            capture.borrow_mut().clear_after_fork();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::host::test_support::NullHost;
    use crate::sink::BufferSink;

    #[test]
    fn notify_without_an_active_capture_is_a_no_op() {
        clear();
        notify_forked_child();
    }

    #[test]
    fn notify_clears_registered_capture_and_stop_then_returns_false() {
        let capture = Rc::new(RefCell::new(Capture::new(
            Config::default(),
            Box::new(NullHost::default()),
            Box::new(BufferSink::default()),
        )));
        capture.borrow_mut().start();
        register(&capture);

        notify_forked_child();

        assert!(!capture.borrow_mut().stop());
        assert!(!capture.borrow().is_running());
    }
}
