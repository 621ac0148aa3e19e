use serde::Serialize;
use thiserror::Error;

/// Failures of the scrape pipeline. Each variant is fatal only for the unit
/// it names: a segment error never aborts its siblings, a page error never
/// aborts other base URLs.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The items start marker was not found in the rendered page. The page
    /// is treated as having zero items, which ends pagination for its base
    /// URL.
    #[error("items start marker not found in page {url}")]
    MarkerNotFound { url: String },

    /// A bounded wait on the renderer expired.
    #[error("render timed out for {url}")]
    RenderTimeout { url: String },

    /// The WebDriver endpoint rejected or failed a command.
    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    /// A base URL that cannot be parsed stops cursor advancement for that
    /// URL only.
    #[error("malformed cursor URL: {url}")]
    MalformedCursorUrl { url: String },

    /// A segment produced nothing extractable despite having content.
    #[error("segment {item_index} yielded no extractable fields")]
    SegmentParse { item_index: usize },

    /// Record sink failure.
    #[error("sink error: {0}")]
    Sink(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Non-fatal conditions, counted per run so callers can audit completeness
/// against the declared item total.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// No count marker matched; the declared total is unknown (taken as 0).
    ItemCountUnknown,
    /// The declared total disagrees with the number of segments produced.
    CountMismatch { declared: usize, observed: usize },
    /// An expansion control failed to activate and was skipped.
    ControlActivation(String),
    /// The expansion loop hit its round cap with controls still present.
    ExpansionNotConverged { rounds: usize },
    /// A segment was skipped because nothing could be extracted from it.
    SegmentParse { item_index: usize },
}

/// Running totals of warnings, aggregated across all pages of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct WarningCounts {
    pub item_count_unknown: usize,
    pub count_mismatch: usize,
    pub control_activation: usize,
    pub expansion_not_converged: usize,
    pub segment_parse: usize,
}

impl WarningCounts {
    pub fn record(&mut self, warning: &Warning) {
        match warning {
            Warning::ItemCountUnknown => self.item_count_unknown += 1,
            Warning::CountMismatch { .. } => self.count_mismatch += 1,
            Warning::ControlActivation(_) => self.control_activation += 1,
            Warning::ExpansionNotConverged { .. } => self.expansion_not_converged += 1,
            Warning::SegmentParse { .. } => self.segment_parse += 1,
        }
    }

    pub fn record_all(&mut self, warnings: &[Warning]) {
        for w in warnings {
            self.record(w);
        }
    }

    pub fn total(&self) -> usize {
        self.item_count_unknown
            + self.count_mismatch
            + self.control_activation
            + self.expansion_not_converged
            + self.segment_parse
    }
}
