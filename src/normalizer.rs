//! Turns one page's raw content into a fragment that can sit inside the book.
//!
//! HTML is re-serialized from the parsed tree in a single pass: stripped
//! subtrees are skipped, every `id` is replaced from the run-wide
//! [`IdCounter`], in-page `#` links lose their `href`, and `h1`/`h2` move one
//! level down so the book's own `h1`/`h2` (section, page) stay on top.

use anyhow::Result;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::model::{IdCounter, NormalizedFragment, PageDescriptor, PagePosition};
use crate::structure::parse_selector;

/// Which part of a page is content and what is thrown away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContentLayout {
    pub content_root: String,
    pub strip: Vec<String>,
}

impl Default for ContentLayout {
    fn default() -> Self {
        Self {
            content_root: "main".to_string(),
            strip: vec![".learn-more".to_string(), "img".to_string(), "script".to_string()],
        }
    }
}

/// Compiled form of [`ContentLayout`].
#[derive(Debug)]
pub struct ContentRules {
    root: Selector,
    strip: Vec<Selector>,
}

impl ContentRules {
    pub fn new(layout: &ContentLayout) -> Result<Self> {
        Ok(Self {
            root: parse_selector(&layout.content_root)?,
            strip: layout
                .strip
                .iter()
                .map(|css| parse_selector(css))
                .collect::<Result<_>>()?,
        })
    }

    fn is_stripped(&self, el: &ElementRef<'_>) -> bool {
        self.strip.iter().any(|sel| sel.matches(el))
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// New tag for a heading, one level down. Only the two levels the book
/// reserves are moved.
pub fn demote_heading(tag: &str) -> Option<&'static str> {
    match tag {
        "h1" => Some("h2"),
        "h2" => Some("h3"),
        _ => None,
    }
}

/// Normalize rendered page HTML.
///
/// Returns the fragment and the counter advanced past every id it claimed.
/// A page without a content root yields an empty fragment and leaves the
/// counter untouched.
pub fn normalize_html(
    raw: &str,
    rules: &ContentRules,
    page: &PageDescriptor,
    position: PagePosition,
    counter: IdCounter,
) -> (NormalizedFragment, IdCounter) {
    let document = Html::parse_document(raw);
    let Some(root) = document.select(&rules.root).next() else {
        return (NormalizedFragment::empty(position, &page.title, counter), counter);
    };

    let start = counter.value() + 1;
    let mut writer = FragmentWriter {
        rules,
        counter,
        out: String::with_capacity(raw.len() / 2),
    };
    writer.children(root, false);

    let FragmentWriter { counter, out, .. } = writer;
    let fragment = NormalizedFragment {
        position,
        title: page.title.clone(),
        body: out.trim().to_string(),
        id_range: start..counter.value() + 1,
    };
    (fragment, counter)
}

struct FragmentWriter<'r> {
    rules: &'r ContentRules,
    counter: IdCounter,
    out: String,
}

impl FragmentWriter<'_> {
    fn children(&mut self, parent: ElementRef<'_>, raw_text: bool) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) if raw_text => self.out.push_str(text),
                Node::Text(text) => self.out.push_str(&html_escape::encode_text(&**text)),
                Node::Comment(comment) => {
                    self.out.push_str("<!--");
                    self.out.push_str(comment);
                    self.out.push_str("-->");
                }
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.element(el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        if self.rules.is_stripped(&el) {
            return;
        }

        let original = el.value().name();
        let tag = demote_heading(original).unwrap_or(original);

        let mut attrs: Vec<(&str, &str)> = el.value().attrs().collect();
        attrs.sort_by(|a, b| a.0.cmp(b.0));

        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            match name {
                "id" => {
                    let id = self.counter.next_id();
                    self.attr(name, &id);
                }
                "href" if value.starts_with('#') => {}
                _ => self.attr(name, value),
            }
        }
        self.out.push('>');

        if VOID_ELEMENTS.contains(&original) {
            return;
        }

        self.children(el, RAW_TEXT_ELEMENTS.contains(&original));
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out
            .push_str(&html_escape::encode_double_quoted_attribute(value));
        self.out.push('"');
    }
}

/// Normalize a raw Markdown page.
///
/// Top-level `# ` headings are dropped (the book supplies the page heading)
/// and `##`..`######` headings gain one `#`. Fenced code is left alone.
pub fn normalize_markdown(
    raw: &str,
    page: &PageDescriptor,
    position: PagePosition,
    counter: IdCounter,
) -> NormalizedFragment {
    let mut fence: Option<&str> = None;
    let mut lines = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            if trimmed.starts_with(open) {
                fence = None;
            }
            lines.push(line.to_string());
            continue;
        }
        if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m)) {
            fence = Some(marker);
            lines.push(line.to_string());
            continue;
        }

        if line.starts_with("# ") {
            lines.push(String::new());
        } else if is_subheading(line) {
            lines.push(format!("#{line}"));
        } else {
            lines.push(line.to_string());
        }
    }

    NormalizedFragment {
        body: lines.join("\n").trim().to_string(),
        ..NormalizedFragment::empty(position, &page.title, counter)
    }
}

fn is_subheading(line: &str) -> bool {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    (2..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regex::Regex;

    fn rules() -> ContentRules {
        ContentRules::new(&ContentLayout::default()).unwrap()
    }

    fn page() -> PageDescriptor {
        PageDescriptor::new("Getting started", "https://nuejs.org/docs/getting-started")
    }

    fn run(raw: &str, counter: IdCounter) -> (NormalizedFragment, IdCounter) {
        normalize_html(raw, &rules(), &page(), PagePosition::new(1, 2), counter)
    }

    const PAGE: &str = r##"<html><body>
        <header id="top">site header</header>
        <main>
          <h1 id="getting-started" class="title">Getting started</h1>
          <p>Read <a href="#install">below</a> or <a href="/docs/cli">the CLI</a>.</p>
          <img src="hero.png">
          <script>track()</script>
          <h2 id="install">Install</h2>
          <h3 id="deep">Deep</h3>
          <div class="learn-more"><a id="cta" href="/docs/more">More</a></div>
          <pre>a &lt; b</pre>
        </main>
        </body></html>"##;

    #[test]
    fn strips_non_portable_nodes() {
        let (fragment, _) = run(PAGE, IdCounter::new());
        assert!(!fragment.body.contains("<img"));
        assert!(!fragment.body.contains("track()"));
        assert!(!fragment.body.contains("learn-more"));
        assert!(!fragment.body.contains("site header"));
    }

    #[test]
    fn remaps_ids_in_document_order() {
        let (fragment, counter) = run(PAGE, IdCounter::new());
        assert!(fragment.body.contains(r#"<h2 class="title" id="id1">"#));
        assert!(fragment.body.contains(r#"<h3 id="id2">Install</h3>"#));
        assert!(fragment.body.contains(r#"<h3 id="id3">Deep</h3>"#));
        // the stripped call-to-action does not consume an id
        assert_eq!(counter.value(), 3);
        assert_eq!(fragment.id_range, 1..4);
    }

    #[test]
    fn continues_from_given_counter() {
        let (first, counter) = run(PAGE, IdCounter::new());
        let (second, counter) = run(PAGE, counter);
        assert_eq!(second.id_range, 4..7);
        assert_eq!(counter.value(), 6);
        assert!(first.id_range.end <= second.id_range.start);
        assert!(second.body.contains(r#"id="id4""#));
    }

    #[test]
    fn in_page_links_become_inert() {
        let (fragment, _) = run(PAGE, IdCounter::new());
        assert!(fragment.body.contains("<a>below</a>"));
        assert!(fragment.body.contains(r#"<a href="/docs/cli">the CLI</a>"#));
    }

    #[test]
    fn headings_move_down_exactly_once() {
        let raw = "<main><h1>A</h1><h2>B</h2><h3>C</h3><h4>D</h4></main>";
        let (fragment, _) = run(raw, IdCounter::new());
        assert_eq!(fragment.body, "<h2>A</h2><h3>B</h3><h3>C</h3><h4>D</h4>");
    }

    #[test]
    fn text_stays_escaped() {
        let (fragment, _) = run(PAGE, IdCounter::new());
        assert!(fragment.body.contains("<pre>a &lt; b</pre>"));
    }

    #[test]
    fn missing_root_gives_empty_fragment() {
        let mut counter = IdCounter::new();
        counter.next_id();
        let (fragment, after) = run("<html><body><p id=\"x\">no main</p></body></html>", counter);
        assert!(fragment.is_empty());
        assert_eq!(after, counter);
        assert_eq!(fragment.title, "Getting started");
    }

    #[test]
    fn markdown_headings_are_demoted() {
        let raw = "# Title\n\nIntro\n\n## Part\n### Sub\n```sh\n# comment\n## not a heading\n```\n#hashtag";
        let fragment = normalize_markdown(raw, &page(), PagePosition::new(1, 1), IdCounter::new());
        assert_eq!(
            fragment.body,
            "Intro\n\n### Part\n#### Sub\n```sh\n# comment\n## not a heading\n```\n#hashtag"
        );
        assert!(fragment.id_range.is_empty());
    }

    proptest! {
        #[test]
        fn prop_ids_are_unique_and_contiguous(ids in prop::collection::vec("[a-z]{1,4}", 0..20)) {
            let body: String = ids
                .iter()
                .map(|id| format!(r#"<section id="{id}"><h2 id="{id}">t</h2></section>"#))
                .collect();
            let raw = format!("<main>{body}</main>");
            let (fragment, counter) = run(&raw, IdCounter::new());

            let re = Regex::new(r#"id="id(\d+)""#).unwrap();
            let found: Vec<u64> = re
                .captures_iter(&fragment.body)
                .map(|c| c[1].parse().unwrap())
                .collect();
            let expected: Vec<u64> = (1..=(ids.len() as u64 * 2)).collect();
            prop_assert_eq!(found, expected);
            prop_assert_eq!(counter.value(), ids.len() as u64 * 2);
        }
    }
}
