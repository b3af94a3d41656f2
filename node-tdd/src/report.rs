//! Structured test report parsing.
//!
//! When a `reporter` is configured, the raw stdout of a run is fed into a
//! streaming parser for that reporter and the summary counters are turned into
//! [`ReportStats`], which the status bar renders as `pass/count` (e.g. `3/4`).
//!
//! Only the Test Anything Protocol is recognized today. An unknown reporter
//! identifier produces no statistics at all; it is not treated as an error.
//!
//! # TAP counting rules
//!
//! The counters mirror what the protocol itself reports rather than a value
//! derived from them:
//!
//! - `pass` counts every `ok` test point, skipped ones included
//! - `fail` counts `not ok` test points that are not marked `# TODO`
//! - `todo` counts test points carrying a `# TODO` directive
//! - `count` counts every test point
//!
//! So `pass` may be smaller than `count - fail` when TODO failures are present.

use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, trace};

/// Summary counters extracted from a structured report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    /// Number of passing assertions, as counted by the protocol.
    pub pass: u32,
    /// Total number of assertions.
    pub count: u32,
}

/// Reporter formats understood by [`parse_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterKind {
    /// Test Anything Protocol (`ok 1 ...` / `not ok 2 ...`).
    Tap,
}

impl FromStr for ReporterKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tap" => Ok(Self::Tap),
            _ => Err(()),
        }
    }
}

/// Parses captured stdout with the named reporter.
///
/// Returns `None` when the reporter is unknown or the output contains no
/// recognizable test results.
#[must_use]
pub fn parse_report(reporter: &str, stdout: &str) -> Option<ReportStats> {
    let Ok(kind) = reporter.parse::<ReporterKind>() else {
        debug!(reporter, "Unknown reporter, skipping report statistics");
        return None;
    };

    match kind {
        ReporterKind::Tap => {
            let mut parser = TapParser::new();
            parser.feed(stdout);
            parser.finish().stats()
        }
    }
}

/// Final counters of a TAP stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapSummary {
    /// `ok` test points, including skipped ones.
    pub pass: u32,
    /// `not ok` test points without a TODO directive.
    pub fail: u32,
    /// Test points with a TODO directive.
    pub todo: u32,
    /// Test points with a SKIP directive.
    pub skip: u32,
    /// All test points.
    pub count: u32,
    /// Number of tests announced by the plan line, if any.
    pub plan: Option<u32>,
    /// Whether the producer bailed out.
    pub bailed_out: bool,
}

impl TapSummary {
    /// Converts the summary into status-bar statistics.
    ///
    /// A stream without any test points has nothing to report.
    #[must_use]
    pub fn stats(&self) -> Option<ReportStats> {
        (self.count > 0).then_some(ReportStats {
            pass: self.pass,
            count: self.count,
        })
    }

    /// Returns `true` if every test point passed and the plan, when present,
    /// was honored.
    #[must_use]
    pub fn ok(&self) -> bool {
        !self.bailed_out && self.fail == 0 && self.plan.is_none_or(|plan| plan == self.count)
    }
}

/// Directive attached to a test point after a `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Skip,
    Todo,
}

/// Streaming, line-oriented TAP parser.
///
/// Input can be fed in arbitrary chunks; incomplete trailing lines are kept
/// until the next chunk or [`TapParser::finish`].
#[derive(Debug, Default)]
pub struct TapParser {
    pending: String,
    summary: TapSummary,
}

impl TapParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of output into the parser.
    pub fn feed(&mut self, chunk: &str) {
        self.pending.push_str(chunk);

        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            self.parse_line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Flushes any incomplete line and returns the final counters.
    #[must_use]
    pub fn finish(mut self) -> TapSummary {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.parse_line(line.trim_end_matches('\r'));
        }
        self.summary
    }

    fn parse_line(&mut self, line: &str) {
        if self.summary.bailed_out {
            return;
        }

        // Indented lines belong to subtests or YAML diagnostics; the parent
        // stream reports the subtest result itself.
        if line.starts_with(' ') || line.starts_with('\t') {
            return;
        }

        if let Some(rest) = line.strip_prefix("not ok") {
            if rest.is_empty() || rest.starts_with(' ') {
                self.record(false, rest);
            }
        } else if let Some(rest) = line.strip_prefix("ok") {
            if rest.is_empty() || rest.starts_with(' ') {
                self.record(true, rest);
            }
        } else if let Some(plan) = parse_plan(line) {
            self.summary.plan = Some(plan);
        } else if line.starts_with("Bail out!") {
            debug!(line, "TAP producer bailed out");
            self.summary.bailed_out = true;
        }
    }

    fn record(&mut self, ok: bool, rest: &str) {
        let directive = parse_directive(rest);
        trace!(ok, ?directive, "TAP test point");

        self.summary.count += 1;
        match directive {
            Some(Directive::Todo) => {
                self.summary.todo += 1;
                if ok {
                    self.summary.pass += 1;
                }
            }
            Some(Directive::Skip) => {
                self.summary.skip += 1;
                if ok {
                    self.summary.pass += 1;
                } else {
                    self.summary.fail += 1;
                }
            }
            None if ok => self.summary.pass += 1,
            None => self.summary.fail += 1,
        }
    }
}

/// Parses a `1..N` plan line, ignoring any trailing `# reason`.
fn parse_plan(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("1..")?;
    let digits: &str = rest.split(|c: char| !c.is_ascii_digit()).next()?;
    digits.parse().ok()
}

fn parse_directive(rest: &str) -> Option<Directive> {
    let (_, comment) = rest.split_once('#')?;
    let word = comment.trim_start().get(..4)?.to_ascii_uppercase();
    match word.as_str() {
        "SKIP" => Some(Directive::Skip),
        "TODO" => Some(Directive::Todo),
        _ => None,
    }
}
