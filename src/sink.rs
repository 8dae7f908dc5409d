//! Byte sinks for rendered reports.
//!
//! The renderer buffers a whole report before flushing it, so a `Sink`
//! only ever sees one complete, indivisible write per stall. This crate
//! does not implement terminal handling itself — it only decides, once,
//! whether the destination looks like a TTY (`std::io::IsTerminal`, stable
//! since Rust 1.70) and picks the matching renderer.

use std::io::{self, IsTerminal, Stderr, Write};

/// Destination for rendered reports.
pub trait Sink {
    fn write_report(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn is_tty(&self) -> bool;
}

/// The process's stderr stream, the default sink.
pub struct StderrSink {
    stderr: Stderr,
    is_tty: bool,
}

impl Default for StderrSink {
    fn default() -> Self {
        let stderr = io::stderr();
        let is_tty = stderr.is_terminal();
        Self { stderr, is_tty }
    }
}

impl Sink for StderrSink {
    fn write_report(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stderr.write_all(bytes)
    }

    fn is_tty(&self) -> bool {
        self.is_tty
    }
}

/// An in-memory sink, primarily useful for tests: never a TTY, records
/// every write so the test can assert on exact report bytes.
#[derive(Default)]
pub struct BufferSink {
    pub buf: Vec<u8>,
}

impl Sink for BufferSink {
    fn write_report(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn is_tty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_is_never_a_tty() {
        let sink = BufferSink::default();
        assert!(!sink.is_tty());
    }

    #[test]
    fn buffer_sink_appends_each_write() {
        let mut sink = BufferSink::default();
        sink.write_report(b"a").unwrap();
        sink.write_report(b"b").unwrap();
        assert_eq!(sink.buf, b"ab");
    }
}
