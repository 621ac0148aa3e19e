use url::Url;

use crate::error::{Result, ScrapeError};

const SKIP_PARAM: &str = "skip";

/// Fetch position in a paged listing. Replaced after each page, never
/// mutated, so `skip` only ever grows for a given base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    url: Url,
    skip: u64,
}

impl PageCursor {
    /// Cursor for the first fetch of a base URL. A URL already carrying a
    /// `skip` parameter starts from that offset.
    pub fn start(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url).map_err(|_| ScrapeError::MalformedCursorUrl {
            url: base_url.to_string(),
        })?;
        let skip = url
            .query_pairs()
            .find(|(k, _)| k == SKIP_PARAM)
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        Ok(Self { url, skip })
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Advance the cursor past the page just processed. With an unknown item
/// count (0) the configured page size stands in, matching how the site's
/// own next-page button steps.
pub fn next_cursor(current: &PageCursor, item_count: usize, page_size_hint: usize) -> PageCursor {
    let step = if item_count > 0 {
        item_count
    } else {
        page_size_hint
    };
    let skip = current.skip + step as u64;

    let mut url = current.url.clone();
    set_skip(&mut url, skip);
    PageCursor { url, skip }
}

/// Replace the skip parameter in place, or append it when absent.
fn set_skip(url: &mut Url, skip: u64) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let had_skip = pairs.iter().any(|(k, _)| k == SKIP_PARAM);

    let mut editor = url.query_pairs_mut();
    editor.clear();
    for (k, v) in &pairs {
        if k == SKIP_PARAM {
            editor.append_pair(SKIP_PARAM, &skip.to_string());
        } else {
            editor.append_pair(k, v);
        }
    }
    if !had_skip {
        editor.append_pair(SKIP_PARAM, &skip.to_string());
    }
    drop(editor);
}

// ── Tests ──
