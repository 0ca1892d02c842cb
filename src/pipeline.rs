use anyhow::{anyhow, Context, Result};
use colored::*;
use slug::slugify;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::assembler::{assemble_html, assemble_markdown, OutputMode};
use crate::browser::BrowserSession;
use crate::links::{LinkMap, LinkRewriter, LinkStats};
use crate::model::{Book, Chapter, IdCounter, NormalizedFragment, SectionDescriptor};
use crate::normalizer::{normalize_html, normalize_markdown, ContentRules};
use crate::profile::SiteProfile;
use crate::source::{HttpSource, PageSource};
use crate::structure::{extract_from_nav, parse_topics, SectionMap};
use crate::writer;

/// What the page source returns and how to normalize it.
pub enum Content<'a> {
    Html {
        rules: &'a ContentRules,
        rewriter: &'a LinkRewriter,
    },
    /// Raw Markdown; links stay as written until the manuscript is rendered.
    Markdown,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub links: LinkStats,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            "Pages processed: {}, failed: {}",
            self.pages_processed.to_string().green(),
            if self.pages_failed > 0 {
                self.pages_failed.to_string().red()
            } else {
                self.pages_failed.to_string().normal()
            }
        );
        info!(
            "Links rewritten: {} internal, {} external, {} unmapped",
            self.links.internal, self.links.external, self.links.unmapped
        );
        if self.links.unmapped > 0 {
            warn!("{} links had no link map entry and point to the original site", self.links.unmapped);
        }
    }
}

/// Fetch and normalize every page, strictly in section then page order.
///
/// A page that cannot be fetched, or has no content, becomes an empty
/// fragment; the run continues.
pub async fn build_book<S: PageSource + ?Sized>(
    source: &S,
    title: &str,
    sections: Vec<SectionDescriptor>,
    content: &Content<'_>,
) -> (Book, RunSummary) {
    let mut summary = RunSummary::default();
    let mut counter = IdCounter::new();
    let mut chapters = Vec::with_capacity(sections.len());

    for section in sections {
        info!("Processing {} section...", section.heading().green());
        let mut fragments = Vec::with_capacity(section.pages.len());

        for (position, page) in section.positions() {
            info!("  Fetching: {} ({})", page.title, page.locator.blue());

            let fragment = match source.fetch(page).await {
                Ok(raw) => match content {
                    Content::Html { rules, rewriter } => {
                        let (fragment, next) = normalize_html(&raw, rules, page, position, counter);
                        counter = next;
                        let (body, stats) = rewriter.rewrite(&fragment.body);
                        summary.links += stats;
                        NormalizedFragment { body, ..fragment }
                    }
                    Content::Markdown => normalize_markdown(&raw, page, position, counter),
                },
                Err(e) => {
                    error!("    ✗ Error processing {} ({}): {:#}", page.title, page.locator, e);
                    NormalizedFragment::empty(position, &page.title, counter)
                }
            };

            if fragment.is_empty() {
                warn!("    ✗ No content for {}", page.title.red());
                summary.pages_failed += 1;
            } else {
                info!("    ✓ Processed: {}", page.title);
                summary.pages_processed += 1;
            }
            fragments.push(fragment);
        }

        chapters.push(Chapter { section, fragments });
    }

    let book = Book {
        title: title.to_string(),
        chapters,
    };
    (book, summary)
}

/// Runs the whole build for one site profile.
pub struct BookBuilder {
    profile: SiteProfile,
    rewriter: LinkRewriter,
    out_dir: PathBuf,
    mode: OutputMode,
    timeout: Duration,
    headful: bool,
}

impl BookBuilder {
    pub fn new(
        profile: SiteProfile,
        link_map: LinkMap,
        out_dir: impl Into<PathBuf>,
        mode: OutputMode,
        timeout_seconds: f64,
    ) -> Result<Self> {
        let rewriter = LinkRewriter::new(link_map, &profile.link_prefix, &profile.external_base)?;
        Ok(Self {
            profile,
            rewriter,
            out_dir: out_dir.into(),
            mode,
            timeout: Duration::from_secs_f64(timeout_seconds),
            headful: false,
        })
    }

    pub fn headful(mut self, headful: bool) -> Self {
        self.headful = headful;
        self
    }

    fn index_url(&self, index_url: Option<&str>) -> Result<Url> {
        let url = index_url.unwrap_or(&self.profile.index_url);
        Url::parse(url).map_err(|e| anyhow!("Invalid index URL {}: {}", url, e))
    }

    async fn discover(&self, session: &BrowserSession, index: &Url) -> Result<Vec<SectionDescriptor>> {
        info!("Fetching documentation structure from {}", index.as_str().green());
        let html = session
            .page_html(index.as_str())
            .await
            .context("Failed to load the documentation index")?;
        let sections = extract_from_nav(&html, index, &self.profile.nav)?;
        info!(
            "Found sections: {}",
            sections.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(self.ordered(sections))
    }

    fn ordered(&self, sections: SectionMap) -> Vec<SectionDescriptor> {
        let ordered = self.profile.order.apply(sections);
        info!(
            "Processing sections in order: {}",
            ordered.iter().map(|s| s.heading()).collect::<Vec<_>>().join(", ")
        );
        ordered
    }

    async fn render_site(
        &self,
        session: &BrowserSession,
        index_url: Option<&str>,
    ) -> Result<(Book, RunSummary)> {
        let index = self.index_url(index_url)?;
        let sections = self.discover(session, &index).await?;
        let rules = ContentRules::new(&self.profile.content)?;
        let content = Content::Html {
            rules: &rules,
            rewriter: &self.rewriter,
        };
        Ok(build_book(session, &self.profile.title, sections, &content).await)
    }

    /// Rendered site → HTML book.
    pub async fn html(&self, index_url: Option<&str>) -> Result<RunSummary> {
        let session = BrowserSession::launch(self.headful, self.timeout).await?;
        let result = self.html_internal(&session, index_url).await;
        session.close().await;
        result
    }

    async fn html_internal(&self, session: &BrowserSession, index_url: Option<&str>) -> Result<RunSummary> {
        let (book, summary) = self.render_site(session, index_url).await?;
        let docs = assemble_html(&book, self.mode);
        let written = writer::write_documents(&self.out_dir.join("html"), &docs).await?;

        info!("✓ Book HTML generation complete ({} files)", written.len());
        summary.log();
        Ok(summary)
    }

    /// Rendered site → PDFs, optionally merged into one file.
    pub async fn pdf(&self, index_url: Option<&str>, combine: bool) -> Result<RunSummary> {
        let session = BrowserSession::launch(self.headful, self.timeout).await?;
        let result = self.pdf_internal(&session, index_url, combine).await;
        session.close().await;
        result
    }

    async fn pdf_internal(
        &self,
        session: &BrowserSession,
        index_url: Option<&str>,
        combine: bool,
    ) -> Result<RunSummary> {
        let (book, summary) = self.render_site(session, index_url).await?;
        let docs = assemble_html(&book, self.mode);
        let pdfs = writer::write_pdfs(session, &self.out_dir.join("pdfs"), &docs).await?;

        if combine && pdfs.len() > 1 {
            info!("Combining all PDFs into a single file...");
            let combined = self.out_dir.join(format!("{}-combined.pdf", slugify(&book.title)));
            writer::merge_pdfs(&pdfs, &combined).await?;
        }

        info!("✓ PDF generation complete ({} files)", pdfs.len());
        summary.log();
        Ok(summary)
    }

    /// Topics file + raw Markdown → Markdown manuscript.
    pub async fn markdown(&self) -> Result<RunSummary> {
        let markdown_base = Url::parse(&self.profile.markdown_base)
            .map_err(|e| anyhow!("Invalid Markdown base {}: {}", self.profile.markdown_base, e))?;
        let source = HttpSource::new(self.timeout, Some(markdown_base))?;

        let topics_url = Url::parse(&self.profile.topics_url)
            .map_err(|e| anyhow!("Invalid topics URL {}: {}", self.profile.topics_url, e))?;
        info!("Fetching topics structure from {}", topics_url.as_str().green());
        let topics = source
            .get_text(&topics_url)
            .await
            .context("Failed to fetch topics structure")?;

        let sections = parse_topics(&topics);
        info!(
            "Found sections: {}",
            sections.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        let sections = self.ordered(sections);

        let (book, summary) =
            build_book(&source, &self.profile.title, sections, &Content::Markdown).await;
        let docs = assemble_markdown(&book, self.mode);
        writer::write_documents(&self.out_dir.join("markdown"), &docs).await?;

        info!("✓ Markdown generation complete!");
        summary.log();
        Ok(summary)
    }
}
