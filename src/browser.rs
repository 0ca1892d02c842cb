use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use colored::*;
use futures_util::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::model::PageDescriptor;
use crate::source::PageSource;

const MM_PER_INCH: f64 = 25.4;

/// Print settings handed to the browser's print-to-PDF.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub scale: f64,
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub margin_mm: f64,
    pub print_background: bool,
}

impl Default for PdfOptions {
    /// US Letter, 20 mm margins on every side.
    fn default() -> Self {
        Self {
            scale: 1.0,
            paper_width_in: 8.5,
            paper_height_in: 11.0,
            margin_mm: 20.0,
            print_background: true,
        }
    }
}

impl PdfOptions {
    fn params(&self) -> PrintToPdfParams {
        let margin = self.margin_mm / MM_PER_INCH;
        PrintToPdfParams {
            scale: Some(self.scale),
            paper_width: Some(self.paper_width_in),
            paper_height: Some(self.paper_height_in),
            margin_top: Some(margin),
            margin_right: Some(margin),
            margin_bottom: Some(margin),
            margin_left: Some(margin),
            print_background: Some(self.print_background),
            ..Default::default()
        }
    }
}

/// A running headless browser used both to read rendered pages and to print
/// assembled documents.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    timeout: Duration,
    settle: Duration,
    pdf_options: PdfOptions,
}

impl BrowserSession {
    pub async fn launch(headful: bool, timeout: Duration) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(timeout);
        if headful {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to create browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // chromium emits protocol messages chromiumoxide has no types for
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            timeout,
            settle: Duration::from_millis(1000),
            pdf_options: PdfOptions::default(),
        })
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("Timed out after {:?} while {}", self.timeout, what)),
        }
    }

    /// Fully rendered HTML of the page at `url`.
    pub async fn page_html(&self, url: &str) -> Result<String> {
        debug!("Rendering \"{}\"", url);
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create new page: {}", e))?;

        let result = self.bounded(&format!("loading {}", url), self.load(&page, url)).await;
        page.close().await.ok();
        result
    }

    async fn load(&self, page: &Page, url: &str) -> Result<String> {
        page.goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| anyhow!("Failed to wait for navigation: {}", e))?;

        // client-side rendering finishes after the load event
        tokio::time::sleep(self.settle).await;

        page.content()
            .await
            .map_err(|e| anyhow!("Failed to get page content: {}", e))
    }

    /// Print an HTML document to PDF bytes.
    pub async fn render_pdf(&self, html: &str) -> Result<Vec<u8>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create new page: {}", e))?;

        let result = self.bounded("printing PDF", self.print(&page, html)).await;
        page.close().await.ok();
        result
    }

    async fn print(&self, page: &Page, html: &str) -> Result<Vec<u8>> {
        page.set_content(html)
            .await
            .map_err(|e| anyhow!("Failed to set page content: {}", e))?;

        page.pdf(self.pdf_options.params())
            .await
            .map_err(|e| anyhow!("Failed to generate PDF: {}", e))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser did not close cleanly: {}", e);
        }
        self.handler.abort();
        info!("{}", "Browser closed".dimmed());
    }
}

#[async_trait(?Send)]
impl PageSource for BrowserSession {
    async fn fetch(&self, page: &PageDescriptor) -> Result<String> {
        self.page_html(&page.locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margins_are_converted_to_inches() {
        let params = PdfOptions::default().params();
        let margin = params.margin_top.unwrap();
        assert!((margin - 20.0 / 25.4).abs() < 1e-9);
        assert_eq!(params.paper_width, Some(8.5));
        assert_eq!(params.print_background, Some(true));
    }
}
