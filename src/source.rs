use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::model::PageDescriptor;

/// Something that can hand over the raw content of a page.
///
/// Implementations do no retrying; the pipeline treats any error as a failed
/// page and moves on.
#[async_trait(?Send)]
pub trait PageSource {
    async fn fetch(&self, page: &PageDescriptor) -> Result<String>;
}

/// Plain HTTP fetcher for raw Markdown sources and the topics index.
pub struct HttpSource {
    client: reqwest::Client,
    /// Base for slug locators; `{base}{slug}.md`.
    markdown_base: Option<Url>,
}

impl HttpSource {
    pub fn new(timeout: Duration, markdown_base: Option<Url>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("site2book/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            markdown_base,
        })
    }

    /// URL a page's content is fetched from.
    pub fn page_url(&self, page: &PageDescriptor) -> Result<Url> {
        if let Ok(url) = Url::parse(&page.locator) {
            return Ok(url);
        }
        let base = self
            .markdown_base
            .as_ref()
            .ok_or_else(|| anyhow!("No base URL to resolve slug \"{}\"", page.locator))?;
        base.join(&format!("{}.md", page.locator))
            .map_err(|e| anyhow!("Failed to join URL for \"{}\": {}", page.locator, e))
    }

    pub async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP error {} for {}", status, url));
        }
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }
}

#[async_trait(?Send)]
impl PageSource for HttpSource {
    async fn fetch(&self, page: &PageDescriptor) -> Result<String> {
        let url = self.page_url(page)?;
        self.get_text(&url).await
    }
}
