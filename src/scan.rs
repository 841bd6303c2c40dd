//! Single-pass streaming scanner.
//!
//! The scanner walks a byte buffer once, cutting it at newlines without ever
//! building a line array, and feeds each line through `classify`. Which table
//! a data line belongs to is tracked by `Mode`; the map under construction is
//! owned by the scan until it's handed back.

use crate::classify::{self, LineOutcome};
use crate::error::{ParseError, Result};
use crate::model::LinkMap;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Knobs for a scan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanConfig {
    /// Progress is considered every time the scan crosses a multiple of this
    /// many bytes.
    pub progress_stride: usize,
    /// Minimum time between two progress reports. The final report is
    /// exempt.
    pub progress_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            progress_stride: 1024,
            progress_interval: Duration::from_millis(300),
        }
    }
}

/// Cooperative cancellation flag, polled by the scanner once per line.
///
/// Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Which table data lines are currently being read into.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    NoTable,
    Objects,
    Sections,
    Symbols,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanStats {
    /// Non-empty lines handed to the state machine.
    pub lines: u64,
    /// Data lines that produced no record.
    pub dropped: u64,
    /// Lines that weren't text in either supported encoding.
    pub undecodable: u64,
}

/// The state machine plus the map it's filling in.
#[derive(Debug, Default)]
pub struct MapBuilder {
    mode: Mode,
    linkmap: Option<LinkMap>,
    stats: ScanStats,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Feeds one raw line, without its newline.
    pub fn feed_bytes(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return;
        }
        match decode_line(raw) {
            Some(line) => self.feed(&line),
            None => {
                self.stats.undecodable += 1;
                trace!(len = raw.len(), "dropping undecodable line");
            }
        }
    }

    /// Feeds one decoded line.
    pub fn feed(&mut self, line: &str) {
        self.stats.lines += 1;
        match classify::classify(line) {
            LineOutcome::PathMeta(path) => {
                if let Some(previous) = &self.linkmap {
                    warn!(
                        previous = %previous.path,
                        path,
                        "second # Path: header, starting over"
                    );
                }
                self.linkmap = Some(LinkMap::new(path));
            }
            LineOutcome::ArchMeta(arch) => {
                if let Some(map) = &mut self.linkmap {
                    map.arch = arch.to_string();
                }
            }
            LineOutcome::BeginObjects => self.mode = Mode::Objects,
            LineOutcome::BeginSections => self.mode = Mode::Sections,
            LineOutcome::BeginSymbols => self.mode = Mode::Symbols,
            LineOutcome::Comment => (),
            LineOutcome::DataLine(data) => {
                if !self.accept(data) {
                    self.stats.dropped += 1;
                    trace!(mode = ?self.mode, line = data, "dropping line");
                }
            }
        }
    }

    /// Routes a data line to the active table. Returns whether it produced a
    /// record.
    fn accept(&mut self, line: &str) -> bool {
        let Some(map) = &mut self.linkmap else {
            return false;
        };
        match self.mode {
            Mode::NoTable => false,
            Mode::Objects => match classify::parse_object_line(line) {
                Some(o) => {
                    map.objects.push(o);
                    true
                }
                None => false,
            },
            Mode::Sections => match classify::parse_section_line(line) {
                Some(s) => {
                    map.sections.push(s);
                    true
                }
                None => false,
            },
            Mode::Symbols => match classify::parse_symbol_line(line) {
                Some(s) => {
                    map.symbols.push(s);
                    true
                }
                None => false,
            },
        }
    }

    /// Ends the scan. Without a `# Path:` header there's nothing to return.
    pub fn finish(self) -> Result<LinkMap> {
        debug!(
            lines = self.stats.lines,
            dropped = self.stats.dropped,
            undecodable = self.stats.undecodable,
            "scan finished"
        );
        self.linkmap.ok_or(ParseError::ParseFailed)
    }
}

fn decode_line(raw: &[u8]) -> Option<Cow<'_, str>> {
    match std::str::from_utf8(raw) {
        Ok(s) => Some(Cow::Borrowed(s)),
        Err(_) => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling_and_without_replacement(raw),
    }
}

struct ProgressThrottle {
    stride: u64,
    interval: Duration,
    next_mark: u64,
    last_report: Instant,
}

impl ProgressThrottle {
    fn new(config: &ScanConfig) -> Self {
        let stride = config.progress_stride.max(1) as u64;
        Self {
            stride,
            interval: config.progress_interval,
            next_mark: stride,
            last_report: Instant::now(),
        }
    }

    /// The `(total, total)` report is left to the end of the scan.
    fn tick(&mut self, consumed: u64, total: u64, on_progress: &mut impl FnMut(u64, u64)) {
        if consumed < self.next_mark || consumed >= total {
            return;
        }
        self.next_mark = (consumed / self.stride + 1) * self.stride;
        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.interval {
            self.last_report = now;
            on_progress(consumed, total);
        }
    }
}

/// Parses a whole linker map out of `bytes`.
///
/// `on_progress(consumed, total)` is called now and then during the scan and
/// exactly once more with `consumed == total` when the scan gets to the end.
/// `cancel` is checked before every line; once it's set the scan stops with
/// `ParseError::Canceled` and whatever was accumulated is thrown away.
pub fn scan(
    bytes: &[u8],
    config: &ScanConfig,
    mut on_progress: impl FnMut(u64, u64),
    cancel: &CancelToken,
) -> Result<LinkMap> {
    let total = bytes.len() as u64;
    let mut builder = MapBuilder::new();
    let mut throttle = ProgressThrottle::new(config);
    let mut line_start = 0;

    let line_ends = memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
    for line_end in line_ends {
        if cancel.is_canceled() {
            debug!(consumed = line_start, total, "scan canceled");
            return Err(ParseError::Canceled);
        }
        if line_end > line_start {
            builder.feed_bytes(&bytes[line_start..line_end]);
        }
        line_start = line_end + 1;
        throttle.tick(line_start.min(bytes.len()) as u64, total, &mut on_progress);
    }

    on_progress(total, total);
    builder.finish()
}
