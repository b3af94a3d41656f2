//! Coverage extraction from free-form test output.
//!
//! Coverage tools print their summaries in many different shapes, so the
//! default parser does not try to understand any of them. It averages every
//! percentage it can find instead:
//!
//! ```text
//! Statements   : 94.55% ( 52/55 )
//! Branches     : 100% ( 6/6 )        =>  (94.55 + 100 + 85 + 94.44) / 4  =  93.50
//! Functions    : 85% ( 17/20 )
//! Lines        : 94.44% ( 51/54 )
//! ```
//!
//! Every line containing a `%` counts, including lines that have nothing to do
//! with coverage (a test printing "50% done" skews the result). That is the
//! documented behavior of the heuristic. The [`CoverageParser`] trait exists so
//! a stricter, report-aware parser can replace it without touching the build
//! trigger.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// An aggregate coverage percentage in the range `0..=100`, rounded to two
/// decimal places.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct CoverageValue(f64);

impl CoverageValue {
    /// Creates a coverage value, rounding to two decimals and clamping into
    /// `0..=100`.
    #[must_use]
    pub fn new(percent: f64) -> Self {
        let rounded = (percent * 100.0).round() / 100.0;
        Self(rounded.clamp(0.0, 100.0))
    }

    /// Returns the percentage as a float.
    #[must_use]
    pub fn percent(self) -> f64 {
        self.0
    }

    /// Returns `true` when the value reaches the given threshold.
    #[must_use]
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl fmt::Display for CoverageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64's Display already drops trailing zeros: 84.0 -> "84", 93.5 -> "93.5"
        write!(f, "{}%", self.0)
    }
}

/// Extracts a single coverage figure from the output of one test run.
///
/// Implementations must be pure: the same text always yields the same value,
/// and text without any coverage information yields `None`.
pub trait CoverageParser: Send + Sync {
    /// Parses accumulated run output into a coverage value.
    fn parse(&self, text: &str) -> Option<CoverageValue>;
}

/// The default heuristic: mean of the first percentage found on every line
/// that contains a `%` sign.
///
/// Lines that contain `%` but no number directly in front of it still count
/// and contribute `0` to the mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentAverage;

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+\.?\d*|\.\d+)%").expect("percent pattern is valid"))
}

impl CoverageParser for PercentAverage {
    fn parse(&self, text: &str) -> Option<CoverageValue> {
        let pattern = percent_pattern();

        let percentages: Vec<f64> = text
            .lines()
            .filter(|line| line.contains('%'))
            .map(|line| {
                pattern
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(0.0)
            })
            .collect();

        if percentages.is_empty() {
            return None;
        }

        let total: f64 = percentages.iter().sum();
        Some(CoverageValue::new(total / percentages.len() as f64))
    }
}

/// Convenience wrapper around [`PercentAverage`].
#[must_use]
pub fn parse_coverage(text: &str) -> Option<CoverageValue> {
    PercentAverage.parse(text)
}
