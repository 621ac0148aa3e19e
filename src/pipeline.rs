use std::time::Duration;

use anyhow::Result;
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::cursor::{next_cursor, PageCursor};
use crate::db::{PageBatch, Sink};
use crate::error::{ScrapeError, WarningCounts};
use crate::expand::{self, expand_fully};
use crate::parser::{self, segments::Markers};
use crate::renderer::{Render, RenderedDocument};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cursor step when a page's item count is unknown.
    pub page_size_hint: usize,
    /// Optional safety cap on pages per base URL; zero-items remains the
    /// normal termination.
    pub max_pages: Option<usize>,
    pub max_expand_rounds: usize,
    /// Wait after each control activation for disclosed content to attach.
    pub settle: Duration,
    pub markers: Markers,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            page_size_hint: DEFAULT_PAGE_SIZE,
            max_pages: None,
            max_expand_rounds: expand::DEFAULT_MAX_ROUNDS,
            settle: expand::DEFAULT_SETTLE,
            markers: Markers::default(),
        }
    }
}

/// Outcome of draining one base URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub records_emitted: usize,
    pub pages_processed: usize,
    pub warnings: WarningCounts,
}

/// Drain one base URL: expand, capture, segment, reconstruct, and emit page
/// by page until a page yields zero items.
///
/// Each page's records reach the sink as one ordered batch before the next
/// fetch begins. A missing start marker counts as a zero-item page; a render
/// timeout or sink failure aborts this base URL only.
pub async fn run<R: Render, S: Sink>(
    renderer: &mut R,
    sink: &mut S,
    base_url: &str,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let mut cursor = PageCursor::start(base_url)?;
    let mut summary = RunSummary::default();

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("{} (skip={})", base_url, cursor.skip()));

    loop {
        if let Some(cap) = opts.max_pages {
            if summary.pages_processed >= cap {
                warn!(
                    "Page cap {} reached for {} before pagination was exhausted",
                    cap, base_url
                );
                break;
            }
        }

        renderer.render(cursor.as_str()).await?;

        let mut page_warnings = Vec::new();
        expand_fully(
            renderer,
            opts.max_expand_rounds,
            opts.settle,
            &mut page_warnings,
        )
        .await?;

        // Expansion mutated the page; capture the settled markup.
        let doc = RenderedDocument {
            url: cursor.as_str().to_string(),
            html: renderer.page_source().await?,
        };

        let extract = match parser::process_document(&doc, &opts.markers) {
            Ok(extract) => extract,
            Err(ScrapeError::MarkerNotFound { url }) => {
                info!("No items marker at {}; base URL exhausted", url);
                break;
            }
            Err(e) => return Err(e.into()),
        };
        page_warnings.extend(extract.warnings);
        summary.warnings.record_all(&page_warnings);

        if extract.segment_count == 0 {
            info!(
                "Zero items at skip={}; {} pages drained from {}",
                cursor.skip(),
                summary.pages_processed,
                base_url
            );
            break;
        }

        info!(
            "Page at skip={}: {} items (declared {}), {} records",
            cursor.skip(),
            extract.segment_count,
            extract.declared_total,
            extract.records.len()
        );

        sink.emit_batch(&PageBatch {
            page_url: cursor.as_str(),
            skip: cursor.skip(),
            records: &extract.records,
        })?;
        summary.records_emitted += extract.records.len();
        summary.pages_processed += 1;

        cursor = next_cursor(&cursor, extract.segment_count, opts.page_size_hint);
        pb.set_message(format!("{} (skip={})", base_url, cursor.skip()));
        pb.tick();
    }

    pb.finish_and_clear();
    Ok(summary)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as ScrapeResult;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Renderer stub serving canned pages keyed by URL.
    struct StubRenderer {
        pages: HashMap<String, String>,
        rendered: Vec<String>,
        current: String,
    }

    impl StubRenderer {
        fn new(pages: HashMap<String, String>) -> Self {
            Self {
                pages,
                rendered: Vec::new(),
                current: String::new(),
            }
        }
    }

    #[async_trait]
    impl Render for StubRenderer {
        type Control = ();

        async fn render(&mut self, url: &str) -> ScrapeResult<RenderedDocument> {
            self.rendered.push(url.to_string());
            self.current = self.pages.get(url).cloned().unwrap_or_default();
            Ok(RenderedDocument {
                url: url.to_string(),
                html: self.current.clone(),
            })
        }

        async fn page_source(&mut self) -> ScrapeResult<String> {
            Ok(self.current.clone())
        }

        async fn expand_controls(&mut self) -> ScrapeResult<Vec<()>> {
            Ok(Vec::new())
        }

        async fn activate(&mut self, _control: &()) -> ScrapeResult<()> {
            Ok(())
        }
    }

    /// Sink stub recording batch boundaries and order.
    #[derive(Default)]
    struct VecSink {
        batches: Vec<(String, u64, usize)>,
    }

    impl Sink for VecSink {
        fn emit_batch(&mut self, batch: &PageBatch) -> Result<()> {
            self.batches
                .push((batch.page_url.to_string(), batch.skip, batch.records.len()));
            Ok(())
        }
    }

    fn listing_page(item_count: usize, total: usize) -> String {
        let mut html = String::from("<!-- Items -->");
        for i in 0..item_count {
            html.push_str(&format!("פריט מספר {} מתוך {} תוצאות", i + 1, total));
            html.push_str(&format!("<h3>item {}</h3><p>value {}</p>", i + 1, i + 1));
        }
        if item_count == 0 {
            html.push_str("<div>no results chrome</div>");
        }
        html
    }

    #[tokio::test]
    async fn drains_until_zero_items() {
        let base = "https://x.test/list";
        let pages = HashMap::from([
            (base.to_string(), listing_page(10, 20)),
            (format!("{}?skip=10", base), listing_page(10, 20)),
            (format!("{}?skip=20", base), listing_page(0, 0)),
        ]);
        let mut renderer = StubRenderer::new(pages);
        let mut sink = VecSink::default();

        let summary = run(&mut renderer, &mut sink, base, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.pages_processed, 2);
        // 10 items x (title + value) per page
        assert_eq!(summary.records_emitted, 40);
        assert_eq!(
            renderer.rendered,
            vec![
                base.to_string(),
                format!("{}?skip=10", base),
                format!("{}?skip=20", base),
            ]
        );
        assert_eq!(sink.batches.len(), 2);
        assert_eq!(sink.batches[0], (base.to_string(), 0, 20));
        assert_eq!(sink.batches[1], (format!("{}?skip=10", base), 10, 20));
    }

    #[tokio::test]
    async fn missing_marker_ends_base_url() {
        let base = "https://x.test/empty";
        let pages = HashMap::from([(base.to_string(), "<html>no marker</html>".to_string())]);
        let mut renderer = StubRenderer::new(pages);
        let mut sink = VecSink::default();

        let summary = run(&mut renderer, &mut sink, base, &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.pages_processed, 0);
        assert!(sink.batches.is_empty());
    }

    #[tokio::test]
    async fn count_mismatch_is_counted_not_fatal() {
        let base = "https://x.test/short";
        // Page declares 5 but renders 2 items, then an empty page.
        let pages = HashMap::from([
            (base.to_string(), listing_page(2, 5)),
            (format!("{}?skip=2", base), listing_page(0, 0)),
        ]);
        let mut renderer = StubRenderer::new(pages);
        let mut sink = VecSink::default();

        let summary = run(&mut renderer, &mut sink, base, &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.pages_processed, 1);
        assert_eq!(summary.warnings.count_mismatch, 1);
    }

    #[tokio::test]
    async fn page_cap_stops_a_runaway_listing() {
        // Every page returns items and advances by 10.
        let base = "https://x.test/loop";
        let mut pages = HashMap::from([(base.to_string(), listing_page(10, 100))]);
        for skip in (10..200).step_by(10) {
            pages.insert(format!("{}?skip={}", base, skip), listing_page(10, 100));
        }
        let mut renderer = StubRenderer::new(pages);
        let mut sink = VecSink::default();

        let opts = RunOptions {
            max_pages: Some(3),
            ..RunOptions::default()
        };
        let summary = run(&mut renderer, &mut sink, base, &opts).await.unwrap();
        assert_eq!(summary.pages_processed, 3);
        assert_eq!(renderer.rendered.len(), 3);
    }

    #[tokio::test]
    async fn malformed_base_url_is_an_error() {
        let mut renderer = StubRenderer::new(HashMap::new());
        let mut sink = VecSink::default();
        let result = run(
            &mut renderer,
            &mut sink,
            "definitely not a url",
            &RunOptions::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(renderer.rendered.is_empty());
    }
}
