//! Human-readable, terminal-oriented report form.

use std::fmt::Write as _;

use super::RenderedStall;

const DIM: &str = "\x1b[2m";
const BOLD_RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Renders a stall as indented, T+-offset lines, one per surviving call,
/// interleaved with dimmed "skipped"/"filtered" markers.
pub fn render(stall: &RenderedStall) -> Vec<u8> {
    let mut out = String::new();
    writeln!(
        out,
        "stall: {:.6}s (switches={} samples={} stalls={})",
        stall.duration, stall.switches, stall.samples, stall.stalls
    )
    .unwrap();

    for call in &stall.calls {
        if call.skipped > 0 {
            writeln!(
                out,
                "{}{}... skipped {} nested calls ...{}",
                "\t".repeat(call.nesting as usize),
                DIM,
                call.skipped,
                RESET
            )
            .unwrap();
        }

        let indent = "\t".repeat(call.nesting as usize);
        let path = call.path.as_deref().unwrap_or("?");
        let class = call.class.as_deref().unwrap_or("?");
        let method = call.method.as_deref().unwrap_or("?");
        let line = format!(
            "{indent}{path}:{line} {kind} {class}#{method} {duration:.6}s T+{offset:.3}",
            line = call.line,
            kind = call.event_kind_name,
            duration = call.duration,
            offset = call.offset,
        );
        if call.expensive {
            writeln!(out, "{BOLD_RED}{line}{RESET}").unwrap();
        } else {
            writeln!(out, "{line}").unwrap();
        }

        if call.filtered > 0 {
            writeln!(
                out,
                "{}\t{}... filtered {} direct calls ...{}",
                indent, DIM, call.filtered, RESET
            )
            .unwrap();
        }
    }

    if let Some(skipped) = stall.trailing_skipped {
        writeln!(out, "{DIM}... skipped {skipped} nested calls ...{RESET}").unwrap();
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Counters, RenderedCall};
    use std::sync::Arc;

    fn stall_with(calls: Vec<RenderedCall>, trailing_skipped: Option<u32>) -> RenderedStall {
        RenderedStall {
            start_time: 0.0,
            duration: 0.02,
            calls,
            trailing_skipped,
            switches: 2,
            samples: 1,
            stalls: 1,
        }
    }

    fn call() -> RenderedCall {
        RenderedCall {
            path: Some(Arc::from("/app/worker.rb")),
            line: 12,
            class: Some(Arc::from("Kernel")),
            method: Some(Arc::from("sleep")),
            event_kind_name: "call",
            duration: 0.01,
            offset: 0.0,
            nesting: 0,
            skipped: 0,
            filtered: 0,
            expensive: false,
        }
    }

    #[test]
    fn emits_path_line_and_method_for_each_call() {
        let text = String::from_utf8(render(&stall_with(vec![call()], None))).unwrap();
        assert!(text.contains("/app/worker.rb:12"));
        assert!(text.contains("Kernel#sleep"));
    }

    #[test]
    fn highlights_expensive_frames() {
        let mut c = call();
        c.expensive = true;
        let text = String::from_utf8(render(&stall_with(vec![c], None))).unwrap();
        assert!(text.contains(BOLD_RED));
    }

    #[test]
    fn emits_skip_marker_before_the_call_that_ends_the_run() {
        let mut c = call();
        c.skipped = 3;
        let text = String::from_utf8(render(&stall_with(vec![c], None))).unwrap();
        assert!(text.contains("skipped 3 nested calls"));
    }

    #[test]
    fn emits_filtered_trailer_under_the_parent() {
        let mut c = call();
        c.filtered = 2;
        let text = String::from_utf8(render(&stall_with(vec![c], None))).unwrap();
        assert!(text.contains("filtered 2 direct calls"));
    }

    #[test]
    fn emits_trailing_skip_marker_with_no_following_call() {
        let text = String::from_utf8(render(&stall_with(vec![call()], Some(5)))).unwrap();
        assert!(text.contains("skipped 5 nested calls"));
    }
}
