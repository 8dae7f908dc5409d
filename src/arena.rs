//! A paged, append-only store of call records.
//!
//! Frames are addressed by a `(page, slot)` handle rather than a raw
//! pointer: since lookups always go back through the owning [`Arena`], a
//! growing `Vec<Page>` can relocate pages freely without invalidating a
//! handle captured earlier — the index is still correct, it just resolves
//! through whatever memory the page now lives in. A parent pointer stored
//! in a live frame survives a sibling push this way, without the
//! self-referential-pointer bookkeeping a raw address would need.
//!
//! Each [`Page`] is a fixed-capacity array sized so the page occupies
//! roughly one native memory page (~32 KiB), built from plain heap storage
//! rather than `mmap`.

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::clock::Timestamp;
use crate::error::CaptureError;
use crate::event::RawEventKind;

/// Frames per page, chosen so `PAGE_CAPACITY * size_of::<Frame>()` lands
/// close to one 32 KiB memory page.
const PAGE_CAPACITY: usize = 256;

type Page = ArrayVec<Frame, PAGE_CAPACITY>;

/// A stable reference to a frame previously returned by [`Arena::push`].
///
/// Valid from push until the next `pop`/`truncate` that removes it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FrameHandle {
    page: usize,
    slot: usize,
}

/// One call record: the arena's element type.
#[derive(Clone, Debug)]
pub struct Frame {
    pub enter_time: Timestamp,
    /// Finalized on return or on interval flush; `None` while still open.
    pub duration: Option<f64>,
    pub nesting: i64,
    pub children: u32,
    pub filtered: u32,
    pub event_kind: RawEventKind,
    pub method_id: Option<Arc<str>>,
    pub class_name: Option<Arc<str>>,
    pub path: Option<Arc<str>>,
    pub line: u32,
    pub parent: Option<FrameHandle>,
}

impl Frame {
    pub fn new(enter_time: Timestamp, nesting: i64, event_kind: RawEventKind) -> Self {
        Self {
            enter_time,
            duration: None,
            nesting,
            children: 0,
            filtered: 0,
            event_kind,
            method_id: None,
            class_name: None,
            path: None,
            line: 0,
            parent: None,
        }
    }
}

/// Append-mostly container of [`Frame`]s for one capture interval.
///
/// Truncation resets every page's length but keeps the pages (and their
/// allocations) around for the next interval, so steady-state captures
/// settle into zero additional allocation per interval once the working
/// set of pages has been grown once.
#[derive(Default)]
pub struct Arena {
    pages: Vec<Page>,
    /// Number of pages that currently hold at least one live frame, used
    /// to find `last()` without scanning every page.
    active_pages: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `frame`, returning a handle that stays valid until the next
    /// `pop`/`truncate` that removes it.
    ///
    /// Fails with [`CaptureError::AllocationFailure`] if a new page is
    /// needed and the allocator can't provide one; the caller aborts the
    /// current interval in that case.
    pub fn push(&mut self, frame: Frame) -> Result<FrameHandle, CaptureError> {
        // `active_pages` must only ever advance past a page index once
        // `ensure_page` has actually secured that page; bumping it first and
        // allocating after would leave `active_pages` pointing past
        // `pages.len()` on an `AllocationFailure`, and every other method
        // here indexes `pages` up to `active_pages` without re-checking.
        let page_idx = if self.active_pages == 0 {
            self.ensure_page(0)?;
            0
        } else {
            let idx = self.active_pages - 1;
            if self.pages[idx].is_full() {
                self.ensure_page(idx + 1)?;
                idx + 1
            } else {
                idx
            }
        };
        if page_idx >= self.active_pages {
            self.active_pages = page_idx + 1;
        }
        let page = &mut self.pages[page_idx];
        let slot = page.len();
        page.push(frame);
        Ok(FrameHandle {
            page: page_idx,
            slot,
        })
    }

    fn ensure_page(&mut self, idx: usize) -> Result<(), CaptureError> {
        if self.pages.len() > idx {
            return Ok(());
        }
        self.pages
            .try_reserve(1)
            .map_err(|_| CaptureError::AllocationFailure)?;
        self.pages.push(Page::new());
        Ok(())
    }

    pub fn get(&self, handle: FrameHandle) -> &Frame {
        &self.pages[handle.page][handle.slot]
    }

    pub fn get_mut(&mut self, handle: FrameHandle) -> &mut Frame {
        &mut self.pages[handle.page][handle.slot]
    }

    /// The most recently pushed frame not yet popped.
    pub fn last(&self) -> Option<FrameHandle> {
        if self.active_pages == 0 {
            return None;
        }
        let mut page_idx = self.active_pages - 1;
        loop {
            if let Some(slot) = self.pages[page_idx].len().checked_sub(1) {
                return Some(FrameHandle {
                    page: page_idx,
                    slot,
                });
            }
            if page_idx == 0 {
                return None;
            }
            page_idx -= 1;
        }
    }

    /// Removes and drops the last frame; its handle is no longer valid.
    pub fn pop(&mut self) -> Option<Frame> {
        while self.active_pages > 0 {
            let page_idx = self.active_pages - 1;
            if let Some(frame) = self.pages[page_idx].pop() {
                return Some(frame);
            }
            self.active_pages -= 1;
        }
        None
    }

    /// Drops every frame; capacity (the page vector) is retained for reuse.
    pub fn truncate(&mut self) {
        for page in &mut self.pages[..self.active_pages] {
            page.clear();
        }
        self.active_pages = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.active_pages == 0 || self.last().is_none()
    }

    /// Forward iteration from oldest to newest surviving frame.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.iter_with_handles().map(|(_, frame)| frame)
    }

    /// Forward iteration paired with each frame's handle, so a consumer
    /// (the renderer) can look up a frame's parent by handle while walking.
    pub fn iter_with_handles(&self) -> impl Iterator<Item = (FrameHandle, &Frame)> {
        self.pages[..self.active_pages.min(self.pages.len())]
            .iter()
            .enumerate()
            .flat_map(|(page_idx, page)| {
                page.iter().enumerate().map(move |(slot, frame)| {
                    (
                        FrameHandle {
                            page: page_idx,
                            slot,
                        },
                        frame,
                    )
                })
            })
    }

    /// Bytes allocated by the arena's pages, for hosts' memory accounting.
    pub fn memory_size(&self) -> usize {
        self.pages.len() * std::mem::size_of::<Page>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    fn frame(clock: &Clock) -> Frame {
        Frame::new(clock.now(), 0, RawEventKind::Call)
    }

    #[test]
    fn push_then_last_resolves_same_frame() {
        let clock = Clock::new();
        let mut arena = Arena::new();
        let h1 = arena.push(frame(&clock)).unwrap();
        let h2 = arena.push(frame(&clock)).unwrap();
        assert_eq!(arena.last(), Some(h2));
        arena.get_mut(h1).line = 42;
        assert_eq!(arena.get(h1).line, 42);
    }

    #[test]
    fn handles_survive_sibling_pushes_across_page_boundary() {
        let clock = Clock::new();
        let mut arena = Arena::new();
        let first = arena.push(frame(&clock)).unwrap();
        for _ in 0..(PAGE_CAPACITY * 3) {
            arena.push(frame(&clock)).unwrap();
        }
        arena.get_mut(first).line = 7;
        assert_eq!(arena.get(first).line, 7);
    }

    #[test]
    fn pop_removes_tail_and_shrinks_last() {
        let clock = Clock::new();
        let mut arena = Arena::new();
        let h1 = arena.push(frame(&clock)).unwrap();
        let _h2 = arena.push(frame(&clock)).unwrap();
        assert!(arena.pop().is_some());
        assert_eq!(arena.last(), Some(h1));
    }

    #[test]
    fn truncate_empties_but_keeps_pages_allocated() {
        let clock = Clock::new();
        let mut arena = Arena::new();
        for _ in 0..(PAGE_CAPACITY + 5) {
            arena.push(frame(&clock)).unwrap();
        }
        let page_count_before = arena.pages.len();
        arena.truncate();
        assert!(arena.is_empty());
        assert_eq!(arena.iter().count(), 0);
        assert_eq!(arena.pages.len(), page_count_before);

        // Reusing the arena for a second interval shouldn't grow the page vector.
        for _ in 0..(PAGE_CAPACITY + 5) {
            arena.push(frame(&clock)).unwrap();
        }
        assert_eq!(arena.pages.len(), page_count_before);
    }

    #[test]
    fn iter_visits_in_push_order() {
        let clock = Clock::new();
        let mut arena = Arena::new();
        for i in 0..5 {
            let h = arena.push(frame(&clock)).unwrap();
            arena.get_mut(h).line = i;
        }
        let lines: Vec<u32> = arena.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![0, 1, 2, 3, 4]);
    }
}
