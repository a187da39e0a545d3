//! Handles all user-facing output of a test run.
//!
//! The dispatcher talks to a [`ReportSink`]; the console implementation
//! colorizes PASS/FAIL with `termcolor`, the buffer implementation collects
//! plain text for tests and programmatic capture.

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Column the PASS/FAIL tag is aligned to.
pub const OUTPUT_ALIGN: usize = 50;

/// Receives progress and results from the dispatcher.
pub trait ReportSink {
    /// A (test, target) pair is about to run.
    fn begin(&mut self, label: &str);
    fn pass(&mut self);
    fn fail(&mut self);
    /// Trailing dump of every failure, in run order.
    fn failures(&mut self, failures: &[(String, String)]);
    fn summary(&mut self, failed: usize, attempted: usize);
}

/// Pads `label` so the result tag lines up.
pub fn padded_label(label: &str) -> String {
    format!("{:<width$}", label, width = OUTPUT_ALIGN)
}

pub fn summary_line(failed: usize, attempted: usize) -> String {
    format!("{}/{} tests failed", failed, attempted)
}

/// ConsoleReporter: writes to stdout, with color when it is a terminal.
pub struct ConsoleReporter {
    stdout: StandardStream,
}

impl ConsoleReporter {
    pub fn new(use_colors: bool) -> Self {
        let choice = if use_colors {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn tag(&mut self, text: &str, color: Color) {
        let _ = write!(self.stdout, "[");
        let _ = self.stdout.set_color(ColorSpec::new().set_fg(Some(color)));
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
        let _ = writeln!(self.stdout, "]");
        let _ = self.stdout.flush();
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(atty::is(atty::Stream::Stdout))
    }
}

impl ReportSink for ConsoleReporter {
    fn begin(&mut self, label: &str) {
        let _ = write!(self.stdout, "{}", padded_label(label));
        let _ = self.stdout.flush();
    }

    fn pass(&mut self) {
        self.tag("PASS", Color::Green);
    }

    fn fail(&mut self) {
        self.tag("FAIL", Color::Red);
    }

    fn failures(&mut self, failures: &[(String, String)]) {
        if failures.is_empty() {
            return;
        }
        let _ = writeln!(self.stdout, "Failing tests:");
        for (name, diagnostic) in failures {
            let _ = writeln!(self.stdout, "{}", name);
            let _ = writeln!(self.stdout, "{}", diagnostic);
        }
    }

    fn summary(&mut self, failed: usize, attempted: usize) {
        let _ = writeln!(self.stdout, "{}", summary_line(failed, attempted));
        let _ = self.stdout.flush();
    }
}

/// BufferReporter: collects uncolored output into a String.
#[derive(Debug, Default)]
pub struct BufferReporter {
    pub buffer: String,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl ReportSink for BufferReporter {
    fn begin(&mut self, label: &str) {
        self.buffer.push_str(&padded_label(label));
    }

    fn pass(&mut self) {
        self.buffer.push_str("[PASS]\n");
    }

    fn fail(&mut self) {
        self.buffer.push_str("[FAIL]\n");
    }

    fn failures(&mut self, failures: &[(String, String)]) {
        if failures.is_empty() {
            return;
        }
        self.buffer.push_str("Failing tests:\n");
        for (name, diagnostic) in failures {
            self.buffer.push_str(name);
            self.buffer.push('\n');
            self.buffer.push_str(diagnostic);
            self.buffer.push('\n');
        }
    }

    fn summary(&mut self, failed: usize, attempted: usize) {
        self.buffer.push_str(&summary_line(failed, attempted));
        self.buffer.push('\n');
    }
}
