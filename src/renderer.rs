use std::time::{Duration, Instant};

use async_trait::async_trait;
use thirtyfour::{By, ChromiumLikeCapabilities, DesiredCapabilities, WebDriver, WebElement};
use tracing::debug;

use crate::error::{Result, ScrapeError};

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
const BODY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// XPath for the disclosure buttons the gov.il collectors render; the label
/// depends on the page language.
const EXPAND_CONTROLS_XPATH: &str =
    "//button[contains(text(), 'Show More') or contains(text(), 'פרטים נוספים')]";

/// Script run before capture: page chrome repeats the count-marker text in
/// navigation links, so it has to go before segmentation sees the markup.
const STRIP_CHROME_SCRIPT: &str = "\
    for (const sel of ['header', 'footer']) {\
        const el = document.querySelector(sel);\
        if (el) el.remove();\
    }";

/// Full markup of one fetched page, captured after expansion settled.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub url: String,
    pub html: String,
}

/// Rendering capability the pipeline drives: navigate a URL to settled
/// markup, enumerate disclosure controls, and activate them one at a time.
///
/// Methods take `&mut self` so one pipeline run holds the renderer
/// exclusively; the underlying browser session is never shared.
#[async_trait]
pub trait Render {
    type Control: Send;

    /// Navigate to `url`, wait (bounded) for the document body, and return
    /// the captured markup.
    async fn render(&mut self, url: &str) -> Result<RenderedDocument>;

    /// Re-capture the current markup after expansion mutated the page.
    async fn page_source(&mut self) -> Result<String>;

    /// Disclosure controls currently visible in the rendered state.
    async fn expand_controls(&mut self) -> Result<Vec<Self::Control>>;

    /// Activate one control. May fail independently (stale or inactive
    /// element); callers decide whether that aborts anything.
    async fn activate(&mut self, control: &Self::Control) -> Result<()>;
}

/// `Render` over a remote WebDriver session (chromedriver / selenium grid).
pub struct WebDriverRenderer {
    driver: WebDriver,
    render_timeout: Duration,
    current_url: String,
}

impl WebDriverRenderer {
    /// Connect to the WebDriver endpoint from `WEBDRIVER_URL` (default
    /// localhost:4444) with the Chrome flags the collectors need.
    pub async fn connect(render_timeout: Duration) -> Result<Self> {
        let endpoint =
            std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string());

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;

        let driver = WebDriver::new(&endpoint, caps).await?;
        Ok(Self {
            driver,
            render_timeout,
            current_url: String::new(),
        })
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }

    /// Poll for body presence until the render timeout expires.
    async fn wait_for_body(&self) -> Result<()> {
        let deadline = Instant::now() + self.render_timeout;
        loop {
            if self.driver.find(By::Tag("body")).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::RenderTimeout {
                    url: self.current_url.clone(),
                });
            }
            tokio::time::sleep(BODY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Render for WebDriverRenderer {
    type Control = WebElement;

    async fn render(&mut self, url: &str) -> Result<RenderedDocument> {
        self.current_url = url.to_string();
        self.driver.goto(url).await?;
        self.wait_for_body().await?;
        self.driver.execute(STRIP_CHROME_SCRIPT, Vec::new()).await?;

        let html = self.driver.source().await?;
        debug!("Rendered {} ({} bytes)", url, html.len());
        Ok(RenderedDocument {
            url: url.to_string(),
            html,
        })
    }

    async fn page_source(&mut self) -> Result<String> {
        let html = self.driver.source().await?;
        Ok(html)
    }

    async fn expand_controls(&mut self) -> Result<Vec<WebElement>> {
        let controls = self
            .driver
            .find_all(By::XPath(EXPAND_CONTROLS_XPATH))
            .await?;
        Ok(controls)
    }

    async fn activate(&mut self, control: &WebElement) -> Result<()> {
        control.scroll_into_view().await?;
        control.click().await?;
        Ok(())
    }
}
