//! Recovers the section → pages hierarchy of a documentation site.
//!
//! Two index shapes are understood: the rendered navigation of the docs
//! landing page (section headings each followed by a list of links), and the
//! line-oriented topics file the site is generated from:
//!
//! ```text
//! essentials:
//!   - Why Nue / What it is about
//!   - Command line | cli
//! ```

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::model::PageDescriptor;

/// Section label → pages, in discovery order.
pub type SectionMap = IndexMap<String, Vec<PageDescriptor>>;

/// Selectors describing where the rendered navigation lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NavLayout {
    pub container: String,
    pub section_heading: String,
    pub page_list: String,
    pub page_link: String,
}

impl Default for NavLayout {
    fn default() -> Self {
        Self {
            container: ".topics".to_string(),
            section_heading: "h3".to_string(),
            page_list: "nav.stack".to_string(),
            page_link: "a".to_string(),
        }
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {:?}", css, e))
}

/// Extract sections from the rendered navigation tree of the index page.
///
/// Fails only when the container itself is missing; incomplete sections are
/// dropped with a warning.
pub fn extract_from_nav(html: &str, base: &Url, layout: &NavLayout) -> Result<SectionMap> {
    let container_sel = parse_selector(&layout.container)?;
    let heading_sel = parse_selector(&layout.section_heading)?;
    let list_sel = parse_selector(&layout.page_list)?;
    let link_sel = parse_selector(&layout.page_link)?;

    let document = Html::parse_document(html);
    let Some(container) = document.select(&container_sel).next() else {
        bail!("Could not find navigation container {:?}", layout.container);
    };

    let mut sections = SectionMap::new();

    for heading in container.select(&heading_sel) {
        let Some(heading_id) = heading.value().id() else {
            debug!("Skipping section heading without id");
            continue;
        };

        let text = heading.text().collect::<String>();
        let label = match text.trim() {
            "" => heading_id.to_string(),
            t => t.to_string(),
        };

        let Some(list) = following_page_list(heading, &heading_sel, &list_sel) else {
            warn!("Section \"{}\" has no page list, dropping it", label);
            continue;
        };

        let mut pages = Vec::new();
        for link in list.select(&link_sel) {
            let title = link.text().collect::<String>().trim().to_string();
            let Some(href) = link.value().attr("href") else {
                warn!("Link \"{}\" in section \"{}\" has no href, skipping", title, label);
                continue;
            };
            match base.join(href) {
                Ok(url) => pages.push(PageDescriptor::new(title, url.to_string())),
                Err(e) => warn!("Cannot resolve \"{}\" against {}: {}", href, base, e),
            }
        }

        if pages.is_empty() {
            warn!("Section \"{}\" lists no pages, dropping it", label);
            continue;
        }

        sections.insert(label, pages);
    }

    debug!("Extracted {} sections from navigation", sections.len());
    Ok(sections)
}

/// Nearest following sibling matching the page-list selector, not looking
/// past the next section heading: a heading with no list of its own is
/// dropped instead of taking over the list of the section after it.
fn following_page_list<'a>(
    heading: ElementRef<'a>,
    heading_sel: &Selector,
    list_sel: &Selector,
) -> Option<ElementRef<'a>> {
    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|el| !heading_sel.matches(el))
        .find(|el| list_sel.matches(el))
}

/// Parse the declarative topics list.
pub fn parse_topics(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(entry) = trimmed.strip_prefix("- ") {
            let Some(section) = current.as_ref() else {
                warn!("line {}: page entry outside of a section, skipping", lineno + 1);
                continue;
            };
            match parse_entry(entry) {
                Some(page) => sections.entry(section.clone()).or_default().push(page),
                None => warn!("line {}: malformed entry {:?}, skipping", lineno + 1, entry),
            }
        } else if let Some(key) = trimmed.strip_suffix(':').filter(|_| !trimmed.starts_with('-')) {
            let key = key.trim().to_string();
            sections.insert(key.clone(), Vec::new());
            current = Some(key);
        } else {
            warn!("line {}: unrecognized line {:?}, skipping", lineno + 1, trimmed);
        }
    }

    sections
}

/// Split `Title / description | explicit-slug` into a page descriptor.
/// Anything after a second ` | ` is ignored.
pub fn parse_entry(entry: &str) -> Option<PageDescriptor> {
    let mut segments = entry.split(" | ");
    let content = segments.next().unwrap_or_default();
    let explicit_slug = segments.next();

    let mut parts = content.split(" / ");
    let raw_title = parts.next().unwrap_or_default();
    let desc = parts.next().map(str::trim).unwrap_or_default();

    let title = raw_title.trim();
    if title.is_empty() {
        return None;
    }

    let slug = match explicit_slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => derive_page_slug(raw_title).trim().to_string(),
    };

    Some(PageDescriptor {
        title: title.to_string(),
        locator: slug,
        desc: (!desc.is_empty()).then(|| desc.to_string()),
    })
}

/// Default page slug: lowercase, spaces become hyphens. Punctuation is kept.
pub fn derive_page_slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}
