use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ScrapeError, Warning};
use crate::renderer::RenderedDocument;

/// Count marker as rendered by the gov.il collectors: "פריט מספר <i> מתוך
/// <TOTAL> תוצאות" (item <i> of <TOTAL> results).
static COUNT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"פריט מספר (\d+) מתוך (\d+) תוצאות").unwrap());

pub const DEFAULT_START_MARKER: &str = "<!-- Items -->";
pub const DEFAULT_TRAILING_MARKER: &str = "<!-- End Items -->";

/// Textual delimiters that carve a rendered listing into per-item segments.
#[derive(Debug, Clone)]
pub struct Markers {
    /// Literal that separates the item region from preceding page chrome.
    pub start: String,
    /// Repeating per-item count marker.
    pub count: Regex,
    /// Literal that ends the repeating-item container, if the page has one.
    pub trailing: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_string(),
            count: COUNT_MARKER_RE.clone(),
            trailing: DEFAULT_TRAILING_MARKER.to_string(),
        }
    }
}

/// Output of segmentation: one markup segment per listing item, plus the
/// total the page itself declared (0 when no count marker matched).
#[derive(Debug)]
pub struct Segmentation {
    pub segments: Vec<String>,
    pub declared_total: usize,
    pub warnings: Vec<Warning>,
}

/// Carve the rendered page into per-item segments between count markers.
///
/// A missing start marker is fatal for the page (the caller treats it as
/// zero items). Everything else degrades to warnings: an unknown total, or a
/// segment count that disagrees with the declared total, still returns every
/// segment found.
pub fn segment(doc: &RenderedDocument, markers: &Markers) -> Result<Segmentation> {
    let start = doc
        .html
        .find(&markers.start)
        .ok_or_else(|| ScrapeError::MarkerNotFound {
            url: doc.url.clone(),
        })?;
    let region = &doc.html[start + markers.start.len()..];

    let mut warnings = Vec::new();

    let matches: Vec<(usize, usize)> = markers
        .count
        .find_iter(region)
        .map(|m| (m.start(), m.end()))
        .collect();

    let declared_total = match matches.first() {
        Some(&(first_start, _)) => markers
            .count
            .captures(&region[first_start..])
            .and_then(|caps| caps.get(2))
            .and_then(|total| total.as_str().parse::<usize>().ok())
            .unwrap_or(0),
        None => 0,
    };
    if declared_total == 0 {
        warnings.push(Warning::ItemCountUnknown);
    }

    // No count markers: nothing delimits items, so the page has no segments.
    if matches.is_empty() {
        return Ok(Segmentation {
            segments: Vec::new(),
            declared_total,
            warnings,
        });
    }

    // Split on every marker occurrence; each piece runs from the end of one
    // marker to the start of the next (document order preserved).
    let mut segments = Vec::with_capacity(matches.len());
    for (i, &(_, end)) in matches.iter().enumerate() {
        let piece = match matches.get(i + 1) {
            Some(&(next_start, _)) => &region[end..next_start],
            None => &region[end..],
        };
        if !piece.trim().is_empty() {
            segments.push(piece.to_string());
        }
    }

    // The split also captures whatever sibling markup follows the item
    // container; cut the last segment at the trailing boundary if present.
    if let Some(last) = segments.last_mut() {
        if let Some(boundary) = last.find(&markers.trailing) {
            last.truncate(boundary);
            if last.trim().is_empty() {
                segments.pop();
            }
        }
    }

    if declared_total > 0 && segments.len() != declared_total {
        warnings.push(Warning::CountMismatch {
            declared: declared_total,
            observed: segments.len(),
        });
    }

    Ok(Segmentation {
        segments,
        declared_total,
        warnings,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> RenderedDocument {
        RenderedDocument {
            url: "https://example.test/list?skip=0".to_string(),
            html: html.to_string(),
        }
    }

    fn marker(i: usize, total: usize) -> String {
        format!("פריט מספר {} מתוך {} תוצאות", i, total)
    }

    fn page(items: &[&str], total: usize) -> String {
        let mut html = String::from("<nav>chrome</nav><!-- Items -->preamble");
        for (i, item) in items.iter().enumerate() {
            html.push_str(&marker(i + 1, total));
            html.push_str(item);
        }
        html
    }

    #[test]
    fn splits_into_declared_count() {
        let html = page(&["<div>one</div>", "<div>two</div>", "<div>three</div>"], 3);
        let s = segment(&doc(&html), &Markers::default()).unwrap();
        assert_eq!(s.declared_total, 3);
        assert_eq!(s.segments.len(), 3);
        assert_eq!(s.segments[0], "<div>one</div>");
        assert_eq!(s.segments[2], "<div>three</div>");
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn preamble_before_first_marker_is_discarded() {
        let html = page(&["<div>only</div>"], 1);
        let s = segment(&doc(&html), &Markers::default()).unwrap();
        assert_eq!(s.segments, vec!["<div>only</div>".to_string()]);
    }

    #[test]
    fn missing_start_marker_is_fatal() {
        let err = segment(&doc("<html>no markers here</html>"), &Markers::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::MarkerNotFound { .. }));
    }

    #[test]
    fn missing_count_marker_reports_unknown_total() {
        let s = segment(
            &doc("<!-- Items --><div>unmarked content</div>"),
            &Markers::default(),
        )
        .unwrap();
        assert_eq!(s.declared_total, 0);
        assert!(s.segments.is_empty());
        assert_eq!(s.warnings, vec![Warning::ItemCountUnknown]);
    }

    #[test]
    fn count_mismatch_returns_all_segments() {
        // Declares 5 but only two markers exist.
        let html = page(&["<div>a</div>", "<div>b</div>"], 5);
        let s = segment(&doc(&html), &Markers::default()).unwrap();
        assert_eq!(s.declared_total, 5);
        assert_eq!(s.segments.len(), 2);
        assert_eq!(
            s.warnings,
            vec![Warning::CountMismatch {
                declared: 5,
                observed: 2
            }]
        );
    }

    #[test]
    fn trailing_boundary_truncates_last_segment() {
        let mut html = page(&["<div>a</div>", "<div>b</div>"], 2);
        html.push_str("<!-- End Items --><footer>pagination chrome</footer>");
        let s = segment(&doc(&html), &Markers::default()).unwrap();
        assert_eq!(s.segments.len(), 2);
        assert_eq!(s.segments[1], "<div>b</div>");
    }

    #[test]
    fn whitespace_only_pieces_are_dropped() {
        let html = format!(
            "<!-- Items -->{}<div>real</div>{}  \n\t ",
            marker(1, 2),
            marker(2, 2)
        );
        let s = segment(&doc(&html), &Markers::default()).unwrap();
        assert_eq!(s.segments, vec!["<div>real</div>".to_string()]);
        // 2 declared vs 1 observed
        assert_eq!(
            s.warnings,
            vec![Warning::CountMismatch {
                declared: 2,
                observed: 1
            }]
        );
    }

    #[test]
    fn round_trip_reconstructs_trimmed_region() {
        let html = page(&["<div>x</div>", "<p>y</p>"], 2);
        let s = segment(&doc(&html), &Markers::default()).unwrap();

        let markers = Markers::default();
        let start = html.find(&markers.start).unwrap() + markers.start.len();
        let region = &html[start..];
        let first = markers.count.find(region).unwrap().start();
        let trimmed = &region[first..];

        let marker_texts: Vec<&str> = markers
            .count
            .find_iter(region)
            .map(|m| m.as_str())
            .collect();
        let mut rebuilt = String::new();
        for (m, seg) in marker_texts.iter().zip(&s.segments) {
            rebuilt.push_str(m);
            rebuilt.push_str(seg);
        }
        assert_eq!(rebuilt, trimmed);
    }
}
