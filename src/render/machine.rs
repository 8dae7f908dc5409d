//! Single-line, newline-delimited machine report form.

use std::fmt::Write as _;

use super::{RenderedCall, RenderedStall};

/// Renders one stall as:
///
/// ```text
/// {"start_time":<f>,"duration":<f>,"calls":[{call},...]
///  [,"skipped":<u>],"switches":<u>,"samples":<u>,"stalls":<u>}\n
/// ```
pub fn render(stall: &RenderedStall) -> Vec<u8> {
    let mut out = String::new();
    write!(out, "{{\"start_time\":{:.3}", stall.start_time).unwrap();
    write!(out, ",\"duration\":{:.6}", stall.duration).unwrap();
    out.push_str(",\"calls\":[");
    for (i, call) in stall.calls.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_call(&mut out, call);
    }
    out.push(']');
    if let Some(skipped) = stall.trailing_skipped {
        write!(out, ",\"skipped\":{skipped}").unwrap();
    }
    write!(
        out,
        ",\"switches\":{},\"samples\":{},\"stalls\":{}}}\n",
        stall.switches, stall.samples, stall.stalls
    )
    .unwrap();
    out.into_bytes()
}

fn render_call(out: &mut String, call: &RenderedCall) {
    write!(out, "{{\"path\":\"{}\"", escape(call.path.as_deref())).unwrap();
    write!(out, ",\"line\":{}", call.line).unwrap();
    write!(out, ",\"class\":\"{}\"", escape(call.class.as_deref())).unwrap();
    write!(out, ",\"method\":\"{}\"", escape(call.method.as_deref())).unwrap();
    write!(out, ",\"duration\":{:.6}", call.duration).unwrap();
    write!(out, ",\"offset\":{:.3}", call.offset).unwrap();
    write!(out, ",\"nesting\":{}", call.nesting).unwrap();
    write!(out, ",\"skipped\":{}", call.skipped).unwrap();
    write!(out, ",\"filtered\":{}}}", call.filtered).unwrap();
}

/// Minimal JSON string escaping: this crate only ever needs to escape the
/// two characters a source path or identifier could plausibly contain.
fn escape(s: Option<&str>) -> String {
    let s = s.unwrap_or("");
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}
