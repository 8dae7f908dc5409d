//! Report rendering: a single traversal of a finished interval's frame
//! arena feeds both the TTY and machine report forms.

pub mod machine;
pub mod tty;

use std::collections::HashMap;
use std::sync::Arc;

use crate::arena::{Arena, FrameHandle};
use crate::clock::Timestamp;

/// Frames whose duration exceeds this fraction of their parent's duration
/// are collapsed into the parent's line in the rendered tree.
const SKIP_THRESHOLD: f64 = 0.98;

/// A frame is cosmetically flagged "expensive" once its duration exceeds
/// this fraction of the whole interval.
const EXPENSIVE_THRESHOLD: f64 = 0.2;

#[derive(Clone, Debug)]
pub struct RenderedCall {
    pub path: Option<Arc<str>>,
    pub line: u32,
    pub class: Option<Arc<str>>,
    pub method: Option<Arc<str>>,
    pub event_kind_name: &'static str,
    pub duration: f64,
    pub offset: f64,
    pub nesting: u32,
    pub skipped: u32,
    pub filtered: u32,
    pub expensive: bool,
}

#[derive(Clone, Debug)]
pub struct RenderedStall {
    pub start_time: f64,
    pub duration: f64,
    pub calls: Vec<RenderedCall>,
    pub trailing_skipped: Option<u32>,
    pub switches: usize,
    pub samples: usize,
    pub stalls: usize,
}

pub struct Counters {
    pub switches: usize,
    pub samples: usize,
    pub stalls: usize,
}

/// Walks `frames` in push order, applying the single-child skip collapse,
/// and returns the flattened, depth-annotated call list both renderers
/// consume.
pub fn build(
    frames: &Arena,
    nesting_minimum: i64,
    capture_start: Timestamp,
    switch_time: Timestamp,
    interval_duration: f64,
    counters: Counters,
) -> RenderedStall {
    let mut depth_of: HashMap<FrameHandle, u32> = HashMap::new();
    let mut calls = Vec::new();
    let mut skip_run: u32 = 0;

    for (handle, frame) in frames.iter_with_handles() {
        let frame_duration = frame.duration.unwrap_or(0.0);

        if let Some(parent) = frame.parent {
            let parent_frame = frames.get(parent);
            if parent_frame.children == 1
                && frame_duration > parent_frame.duration.unwrap_or(0.0) * SKIP_THRESHOLD
            {
                let parent_depth = depth_of[&parent];
                depth_of.insert(handle, parent_depth);
                skip_run += 1;
                continue;
            }
        }

        let depth = match frame.parent {
            Some(parent) => depth_of[&parent] + 1,
            None => (frame.nesting - nesting_minimum).max(0) as u32,
        };
        depth_of.insert(handle, depth);

        calls.push(RenderedCall {
            path: frame.path.clone(),
            line: frame.line,
            class: frame.class_name.clone(),
            method: frame.method_id.clone(),
            event_kind_name: frame.event_kind.name(),
            duration: frame_duration,
            offset: frame.enter_time.since(switch_time),
            nesting: depth,
            skipped: skip_run,
            filtered: frame.filtered,
            expensive: frame_duration > interval_duration * EXPENSIVE_THRESHOLD,
        });
        skip_run = 0;
    }

    RenderedStall {
        start_time: switch_time.since(capture_start),
        duration: interval_duration,
        calls,
        trailing_skipped: (skip_run > 0).then_some(skip_run),
        switches: counters.switches,
        samples: counters.samples,
        stalls: counters.stalls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Frame;
    use crate::clock::Clock;
    use crate::event::RawEventKind;

    fn counters() -> Counters {
        Counters {
            switches: 1,
            samples: 1,
            stalls: 1,
        }
    }

    #[test]
    fn single_child_chain_collapses_into_parent() {
        let clock = Clock::new();
        let start = clock.now();
        let mut arena = Arena::new();

        let mut outer = Frame::new(start, 0, RawEventKind::Call);
        outer.duration = Some(1.0);
        let outer_h = arena.push(outer).unwrap();

        let mut inner = Frame::new(start, 1, RawEventKind::Call);
        inner.duration = Some(0.99);
        inner.parent = Some(outer_h);
        arena.get_mut(outer_h).children = 1;
        arena.push(inner).unwrap();

        let rendered = build(&arena, 0, start, start, 1.0, counters());
        assert_eq!(rendered.calls.len(), 1);
        assert_eq!(rendered.calls[0].nesting, 0);
    }

    #[test]
    fn multi_child_frame_is_never_collapsed() {
        let clock = Clock::new();
        let start = clock.now();
        let mut arena = Arena::new();

        let mut outer = Frame::new(start, 0, RawEventKind::Call);
        outer.duration = Some(1.0);
        outer.children = 2;
        let outer_h = arena.push(outer).unwrap();

        for _ in 0..2 {
            let mut child = Frame::new(start, 1, RawEventKind::Call);
            child.duration = Some(0.99);
            child.parent = Some(outer_h);
            arena.push(child).unwrap();
        }

        let rendered = build(&arena, 0, start, start, 1.0, counters());
        assert_eq!(rendered.calls.len(), 3);
        assert_eq!(rendered.calls[1].nesting, 1);
        assert_eq!(rendered.calls[2].nesting, 1);
    }

    #[test]
    fn negative_nesting_is_normalized_to_zero() {
        let clock = Clock::new();
        let start = clock.now();
        let mut arena = Arena::new();

        let mut synthesized = Frame::new(start, -2, RawEventKind::Return);
        synthesized.duration = Some(0.5);
        arena.push(synthesized).unwrap();

        let rendered = build(&arena, -2, start, start, 0.5, counters());
        assert_eq!(rendered.calls[0].nesting, 0);
    }

    #[test]
    fn expensive_flag_follows_twenty_percent_rule() {
        let clock = Clock::new();
        let start = clock.now();
        let mut arena = Arena::new();

        let mut f = Frame::new(start, 0, RawEventKind::Call);
        f.duration = Some(0.3);
        arena.push(f).unwrap();

        let rendered = build(&arena, 0, start, start, 1.0, counters());
        assert!(rendered.calls[0].expensive);
    }
}
