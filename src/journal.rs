//! Shared log sink.
//!
//! All job outcomes are reported as single lines of the form
//!
//! ```text
//! #007: 14:03:59 = 3f786850e387550fdab836ed7e6dc881de23001b  /mnt/dst/a.txt
//! ```
//!
//! that is, `#<job id, zero-padded to 3>: <HH:MM:SS> <glyph> <message>`.
//! Each line is formatted in full and written with one `write_all` while the
//! sink lock is held, so concurrent workers never interleave partial lines.

use chrono::{Local, NaiveTime};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Event classification shown as a one-character prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// Directory, symlink or device node created
    Create,
    /// Regular-file copy started
    Copy,
    /// Destination flushed to durable storage
    Flush,
    /// Digests match
    Match,
    /// Digests differ
    Mismatch,
    /// Ledger record appended
    Record,
    /// Non-fatal problem
    Warning,
    /// Fatal failure of one job or entry
    Fatal,
    /// Run-level information
    Info,
}

impl Glyph {
    /// The prefix written to the log line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Copy => ">",
            Self::Flush => "~",
            Self::Match => "=",
            Self::Mismatch => "!",
            Self::Record => "#",
            Self::Warning => "?",
            Self::Fatal => "x",
            Self::Info => "*",
        }
    }
}

/// Source of the `HH:MM:SS` timestamp.
pub type Clock = fn() -> NaiveTime;

fn local_clock() -> NaiveTime {
    Local::now().time()
}

/// Format one log line (without trailing newline).
pub fn format_line(id: u64, time: NaiveTime, glyph: Glyph, message: &str) -> String {
    format!(
        "#{id:03}: {} {} {message}",
        time.format("%H:%M:%S"),
        glyph.as_str()
    )
}

/// Cloneable handle to the shared log sink.
#[derive(Clone)]
pub struct Journal {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
    clock: Clock,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Journal {
    /// Log to any writer.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            clock: local_clock,
        }
    }

    /// Log to standard output (the default sink).
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Log to standard error.
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// Log to a file, appending if it exists.
    pub fn to_file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }

    /// Log into memory; the returned [`Capture`] reads back what was logged.
    pub fn capture() -> (Self, Capture) {
        let capture = Capture::default();
        (Self::from_writer(capture.clone()), capture)
    }

    /// Replace the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Write one event line.
    ///
    /// Sink errors are swallowed: logging must never fail a job.
    pub fn log(&self, id: u64, glyph: Glyph, message: impl AsRef<str>) {
        let message = message.as_ref();
        let mut line = format_line(id, (self.clock)(), glyph, message);
        line.push('\n');

        {
            let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
            let _ = sink.write_all(line.as_bytes());
            let _ = sink.flush();
        }

        #[cfg(feature = "tracing")]
        match glyph {
            Glyph::Fatal | Glyph::Mismatch => tracing::error!(job = id, "{}", message),
            Glyph::Warning => tracing::warn!(job = id, "{}", message),
            Glyph::Info | Glyph::Match => tracing::info!(job = id, "{}", message),
            _ => tracing::debug!(job = id, "{}", message),
        }
    }

    /// Flush the underlying sink.
    pub fn flush(&self) -> io::Result<()> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

/// In-memory sink returned by [`Journal::capture`].
#[derive(Debug, Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    /// Everything logged so far.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Logged lines carrying the given glyph.
    pub fn lines_with(&self, glyph: Glyph) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line_glyph(line) == Some(glyph))
            .map(str::to_owned)
            .collect()
    }
}

/// Glyph of a formatted line, if it parses.
pub fn line_glyph(line: &str) -> Option<Glyph> {
    let (_, rest) = line.split_once(": ")?;
    let mut parts = rest.splitn(3, ' ');
    let _time = parts.next()?;
    match parts.next()? {
        "+" => Some(Glyph::Create),
        ">" => Some(Glyph::Copy),
        "~" => Some(Glyph::Flush),
        "=" => Some(Glyph::Match),
        "!" => Some(Glyph::Mismatch),
        "#" => Some(Glyph::Record),
        "?" => Some(Glyph::Warning),
        "x" => Some(Glyph::Fatal),
        "*" => Some(Glyph::Info),
        _ => None,
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
