use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::normalizer::ContentLayout;
use crate::ordering::SectionOrder;
use crate::structure::NavLayout;

/// Everything that is specific to one documentation site.
///
/// The default describes nuejs.org. A JSON profile only needs the fields it
/// changes; the rest fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteProfile {
    /// Book title, also the stem of combined output files.
    pub title: String,
    /// Docs landing page holding the rendered navigation.
    pub index_url: String,
    pub nav: NavLayout,
    pub content: ContentLayout,
    /// Declarative topics file used by the Markdown pipeline.
    pub topics_url: String,
    /// Raw Markdown pages live at `{markdown_base}{slug}.md`.
    pub markdown_base: String,
    /// Site path prefix of cross-page links.
    pub link_prefix: String,
    /// Where links without a place in the book point to.
    pub external_base: String,
    pub order: SectionOrder,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            title: "Learning Nue".to_string(),
            index_url: "https://nuejs.org/docs/".to_string(),
            nav: NavLayout::default(),
            content: ContentLayout::default(),
            topics_url: "https://raw.githubusercontent.com/nuejs/nue/refs/heads/master/packages/www/%40shared/data/topics.yaml".to_string(),
            markdown_base: "https://raw.githubusercontent.com/nuejs/nue/refs/heads/master/packages/www/docs/".to_string(),
            link_prefix: "/docs/".to_string(),
            external_base: "https://nuejs.org/docs/".to_string(),
            order: SectionOrder::default(),
        }
    }
}

impl SiteProfile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid site profile")
    }

    /// Load a profile file, or the built-in one when no path is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read profile {}", path.display()))?;
                Self::from_json(&json).with_context(|| format!("In profile {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_profile_keeps_defaults() {
        let profile = SiteProfile::from_json(
            r#"{
                "title": "Other Docs",
                "nav": { "container": "aside" },
                "order": { "priority": ["Intro"], "last": null }
            }"#,
        )
        .unwrap();

        assert_eq!(profile.title, "Other Docs");
        assert_eq!(profile.nav.container, "aside");
        assert_eq!(profile.nav.page_list, "nav.stack");
        assert_eq!(profile.order.priority, vec!["Intro"]);
        assert_eq!(profile.order.last, None);
        assert_eq!(profile.content, ContentLayout::default());
        assert_eq!(profile.link_prefix, "/docs/");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        assert!(SiteProfile::load(Some(Path::new("/nonexistent/profile.json")))
            .await
            .is_err());
        assert_eq!(SiteProfile::load(None).await.unwrap(), SiteProfile::default());
    }

    #[tokio::test]
    async fn loads_profile_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{ "title": "Other Docs" }"#).unwrap();

        let profile = SiteProfile::load(Some(&path)).await.unwrap();
        assert_eq!(profile.title, "Other Docs");
        assert_eq!(profile.index_url, SiteProfile::default().index_url);
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(SiteProfile::from_json(r#"{ "order": { "priority": "Essentials" } }"#).is_err());
    }
}
