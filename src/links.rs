//! Rewriting of cross-page hyperlinks for the composite document.
//!
//! Two address forms point at other pages of the site: the path form
//! (`href="/docs/getting-started"`) and the file form left behind when the
//! markup was rendered from disk (`href="file:///tmp/book/getting-started"`).
//! Both are resolved through a static [`LinkMap`]:
//!
//! * slug mapped to a title → anchor inside the book (`#getting-started`)
//! * slug mapped to `null` → the page on the original site
//! * slug not in the map → the page on the original site, counted as unmapped
//!
//! Neither output form matches the input patterns, so rewriting twice is the
//! same as rewriting once.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::ops::AddAssign;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

const DEFAULT_LINK_MAP: &str = include_str!("linkmap.json");

static FILE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="file:///[^"]*/([^/"]+)""#).expect("FILE_LINK: hardcoded regex is valid")
});

/// Result of looking a slug up in the [`LinkMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget<'a> {
    /// The page lives in the book under this title.
    Section(&'a str),
    /// Explicitly kept as a link to the original site.
    External,
    /// Not in the map at all.
    Unmapped,
}

/// Static table of site slugs → book titles (`None` = stay external).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMap {
    entries: IndexMap<String, Option<String>>,
}

impl LinkMap {
    pub fn from_json(json: &str) -> Result<Self> {
        let entries = serde_json::from_str(json).context("Link map must be a JSON object of slug → title or null")?;
        Ok(Self { entries })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read link map {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid link map {}", path.display()))
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        // the embedded file is checked by the `builtin_map_parses` test
        Self::from_json(DEFAULT_LINK_MAP).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, slug: &str) -> LinkTarget<'_> {
        match self.entries.get(slug) {
            Some(Some(title)) => LinkTarget::Section(title),
            Some(None) => LinkTarget::External,
            None => LinkTarget::Unmapped,
        }
    }
}

/// Counts of rewritten links by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub internal: usize,
    pub external: usize,
    pub unmapped: usize,
}

impl LinkStats {
    pub fn total(&self) -> usize {
        self.internal + self.external + self.unmapped
    }
}

impl AddAssign for LinkStats {
    fn add_assign(&mut self, rhs: Self) {
        self.internal += rhs.internal;
        self.external += rhs.external;
        self.unmapped += rhs.unmapped;
    }
}

#[derive(Debug, Clone)]
pub struct LinkRewriter {
    map: LinkMap,
    path_link: Regex,
    external_base: String,
}

impl LinkRewriter {
    /// `link_prefix` is the site path under which pages live (`/docs/`),
    /// `external_base` the absolute URL fallback links are built on.
    pub fn new(map: LinkMap, link_prefix: &str, external_base: &str) -> Result<Self> {
        let path_link = Regex::new(&format!(r#"href="{}([^"]+)""#, regex::escape(link_prefix)))
            .with_context(|| format!("Invalid link prefix {:?}", link_prefix))?;
        Ok(Self {
            map,
            path_link,
            external_base: external_base.to_string(),
        })
    }

    pub fn rewrite(&self, markup: &str) -> (String, LinkStats) {
        let mut stats = LinkStats::default();
        let pass = self
            .path_link
            .replace_all(markup, |caps: &Captures| self.resolve(&caps[1], &mut stats));
        let out = FILE_LINK
            .replace_all(&pass, |caps: &Captures| self.resolve(&caps[1], &mut stats))
            .into_owned();
        if stats.total() > 0 {
            debug!(
                "Rewrote {} links ({} internal, {} external, {} unmapped)",
                stats.total(),
                stats.internal,
                stats.external,
                stats.unmapped
            );
        }
        (out, stats)
    }

    fn resolve(&self, slug: &str, stats: &mut LinkStats) -> String {
        match self.map.lookup(slug) {
            LinkTarget::Section(title) => {
                stats.internal += 1;
                format!(r##"href="#{}""##, anchor_slug(title))
            }
            LinkTarget::External => {
                stats.external += 1;
                format!(r#"href="{}{}""#, self.external_base, slug)
            }
            LinkTarget::Unmapped => {
                debug!("No link map entry for \"{}\"", slug);
                stats.unmapped += 1;
                format!(r#"href="{}{}""#, self.external_base, slug)
            }
        }
    }
}

/// Anchor derived from a section title: `Command line (CLI)` → `command-line-cli`.
///
/// Unlike [`crate::structure::derive_page_slug`] this drops punctuation.
/// Page blocks carry the same anchor, see [`crate::assembler::PageAnchors`].
pub fn anchor_slug(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rewriter() -> LinkRewriter {
        LinkRewriter::new(LinkMap::builtin(), "/docs/", "https://nuejs.org/docs/").unwrap()
    }

    #[test]
    fn builtin_map_parses() {
        let map = LinkMap::from_json(DEFAULT_LINK_MAP).unwrap();
        assert_eq!(map.len(), LinkMap::builtin().len());
        assert!(!map.is_empty());
    }

    #[tokio::test]
    async fn loads_map_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(&path, r#"{ "cli": "Command line", "demo": null }"#).unwrap();

        let map = LinkMap::load(&path).await.unwrap();
        assert_eq!(map.lookup("cli"), LinkTarget::Section("Command line"));
        assert_eq!(map.lookup("demo"), LinkTarget::External);
        assert!(LinkMap::load(&dir.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn mapped_slug_becomes_anchor() {
        let (out, stats) = rewriter().rewrite(r#"<a href="/docs/getting-started">go</a>"#);
        assert_eq!(out, r##"<a href="#getting-started">go</a>"##);
        assert_eq!(stats.internal, 1);
    }

    #[test]
    fn null_target_becomes_external() {
        let (out, stats) = rewriter().rewrite(r#"<a href="/docs/examples/nue-counter">demo</a>"#);
        assert_eq!(out, r#"<a href="https://nuejs.org/docs/examples/nue-counter">demo</a>"#);
        assert_eq!(stats, LinkStats { internal: 0, external: 1, unmapped: 0 });
    }

    #[test]
    fn unmapped_slug_falls_back_to_external() {
        let (out, stats) = rewriter().rewrite(r#"<a href="/docs/nowhere">x</a>"#);
        assert_eq!(out, r#"<a href="https://nuejs.org/docs/nowhere">x</a>"#);
        assert_eq!(stats.unmapped, 1);
    }

    #[test]
    fn file_links_use_last_segment() {
        let (out, stats) =
            rewriter().rewrite(r##"<a href="file:///home/me/book/cli">cli</a> <a href="#keep">k</a>"##);
        assert_eq!(out, r##"<a href="#command-line-cli">cli</a> <a href="#keep">k</a>"##);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn other_links_are_untouched() {
        let markup = r#"<a href="https://example.com/docs/cli">x</a><a href="/blog/post">y</a>"#;
        let (out, stats) = rewriter().rewrite(markup);
        assert_eq!(out, markup);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn anchor_slug_rules() {
        assert_eq!(anchor_slug("Getting started"), "getting-started");
        assert_eq!(anchor_slug("Command line (CLI)"), "command-line-cli");
        assert_eq!(anchor_slug("  A -- b  "), "a-b");
        assert_eq!(anchor_slug("JS enhancements!"), "js-enhancements");
    }

    proptest! {
        #[test]
        fn prop_rewrite_is_idempotent(
            slugs in prop::collection::vec(
                prop_oneof![
                    Just("getting-started".to_string()),
                    Just("examples/nue-counter".to_string()),
                    Just("cli".to_string()),
                    "[a-z-]{1,12}",
                ],
                0..8
            ),
            file_form in any::<bool>(),
        ) {
            let markup: String = slugs
                .iter()
                .map(|slug| {
                    if file_form {
                        format!(r#"<p><a href="file:///tmp/out/{slug}">l</a></p>"#)
                    } else {
                        format!(r#"<p><a href="/docs/{slug}">l</a></p>"#)
                    }
                })
                .collect();
            let rewriter = rewriter();
            let (once, first) = rewriter.rewrite(&markup);
            let (twice, second) = rewriter.rewrite(&once);
            prop_assert_eq!(once, twice);
            prop_assert_eq!(second.total(), 0);
            if !file_form {
                prop_assert_eq!(first.total(), slugs.len());
            }
        }
    }
}
