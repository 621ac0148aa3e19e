use scraper::{ElementRef, Html};
use url::Url;

use crate::error::{Result, ScrapeError};

/// Tags whose text names the field that follows; everything else with
/// visible text is field content.
const TITLE_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "strong", "b", "label"];

/// Tags whose text is never visible.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    Value,
    Link,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Title => "title",
            FieldKind::Value => "value",
            FieldKind::Link => "link",
        }
    }
}

/// One structured row reconstructed from an item segment, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub item_index: usize,
    pub kind: FieldKind,
    pub text: String,
}

/// Walk one segment's tag tree and emit title/value/link records.
///
/// A single-slot pending title pairs each title tag with the next content
/// tag's text; consecutive titles flush with an empty value, and content
/// with no preceding title is still recorded as a bare value. Every
/// href-bearing tag emits a link regardless of title state. Relative hrefs
/// resolve against `base` when one is given.
///
/// Errors only when the segment has non-whitespace content yet nothing
/// extractable; the caller skips the segment and keeps its siblings.
pub fn reconstruct(
    item_index: usize,
    segment_html: &str,
    base: Option<&Url>,
) -> Result<Vec<FieldRecord>> {
    let fragment = Html::parse_fragment(segment_html);
    let mut records = Vec::new();
    let mut pending_title: Option<String> = None;

    for node in fragment.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        if SKIP_TAGS.contains(&name) {
            continue;
        }

        let text = own_text(&element);

        if let Some(text) = text {
            if TITLE_TAGS.contains(&name) {
                flush_pending(&mut pending_title, item_index, &mut records);
                pending_title = Some(text);
            } else if let Some(title) = pending_title.take() {
                records.push(FieldRecord {
                    item_index,
                    kind: FieldKind::Title,
                    text: title,
                });
                records.push(FieldRecord {
                    item_index,
                    kind: FieldKind::Value,
                    text,
                });
            } else {
                records.push(FieldRecord {
                    item_index,
                    kind: FieldKind::Value,
                    text,
                });
            }
        }

        if let Some(href) = element.value().attr("href") {
            if let Some(link) = resolve_link(href, base) {
                records.push(FieldRecord {
                    item_index,
                    kind: FieldKind::Link,
                    text: link,
                });
            }
        }
    }

    flush_pending(&mut pending_title, item_index, &mut records);

    if records.is_empty() && !segment_html.trim().is_empty() {
        return Err(ScrapeError::SegmentParse { item_index });
    }
    Ok(records)
}

/// A title with no following content still yields an empty value.
fn flush_pending(pending: &mut Option<String>, item_index: usize, records: &mut Vec<FieldRecord>) {
    if let Some(title) = pending.take() {
        records.push(FieldRecord {
            item_index,
            kind: FieldKind::Title,
            text: title,
        });
        records.push(FieldRecord {
            item_index,
            kind: FieldKind::Value,
            text: String::new(),
        });
    }
}

/// Text belonging directly to this element (not its children), so nested
/// tags each account for their own runs exactly once.
fn own_text(element: &ElementRef) -> Option<String> {
    let text = element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.trim()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Absolute link for an href, or None for placeholder anchors. Mirrors the
/// site's relative links by resolving against the page URL.
fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href == "#" {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Some(href.to_string()),
    }
}

// ── Tests ──
