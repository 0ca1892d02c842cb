//! Composite document assembly.
//!
//! The book layout is fixed: `h1` per section (`section{n}`), `h2` per page
//! (`page{n}-{m}`), page content beneath with its own headings already moved
//! down by the normalizer. The table of contents is built from the section
//! and page descriptors only, so it lists every page whether or not its
//! content could be fetched.

use clap::ValueEnum;
use html_escape::encode_text;
use serde::{Deserialize, Serialize};
use slug::slugify;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::path::PathBuf;
use tracing::warn;

use crate::links::anchor_slug;
use crate::model::{Book, Chapter, NormalizedFragment, PagePosition, SectionDescriptor};

/// How the book is split into output documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One document with everything.
    Combined,
    /// A table of contents plus one document per section.
    #[default]
    Sections,
    /// A table of contents plus one document per page.
    Pages,
}

/// An assembled document, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    /// Path relative to the output directory.
    pub path: PathBuf,
    pub title: String,
    pub contents: String,
}

pub const STYLESHEET: &str = r#"<style>
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; line-height: 1.6; max-width: 800px; margin: 0 auto; padding: 20px; }
h1 { color: #2563eb; border-bottom: 2px solid #e5e7eb; padding-bottom: 10px; }
h2 { color: #1f2937; margin-top: 2em; }
h3 { color: #374151; }
code { background: #f3f4f6; padding: 2px 4px; border-radius: 3px; }
pre { background: #f3f4f6; padding: 1em; border-radius: 6px; overflow-x: auto; }
blockquote { border-left: 4px solid #e5e7eb; margin: 1em 0; padding-left: 1em; color: #6b7280; }
.section-break { page-break-before: always; margin-top: 3em; }
.chapter { page-break-before: always; }
article { page-break-inside: avoid; }
section { break-inside: avoid-page; }
.toc { page-break-after: always; }
.toc ul { list-style: none; padding-left: 0; }
.toc ul ul { padding-left: 10px; }
.toc li { margin: 5px 0; }
.toc a { text-decoration: none; color: #374151; }
</style>"#;

fn html_document(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
{css}
</head>
<body>
{body}</body>
</html>
"#,
        title = encode_text(title),
        css = STYLESHEET,
    )
}

fn section_dir(section: &SectionDescriptor) -> String {
    format!("{:02}-{}", section.number, slugify(&section.key))
}

fn chapter_file(section: &SectionDescriptor, ext: &str) -> PathBuf {
    PathBuf::from(format!("chapter-{:02}-{}.{}", section.number, slugify(&section.key), ext))
}

fn page_file(section: &SectionDescriptor, fragment: &NormalizedFragment, ext: &str) -> PathBuf {
    PathBuf::from(section_dir(section)).join(format!(
        "{:02}-{}.{}",
        fragment.position.page,
        slugify(&fragment.title),
        ext
    ))
}

fn book_file(book: &Book, ext: &str) -> PathBuf {
    let stem = match slugify(&book.title) {
        s if s.is_empty() => "book".to_string(),
        s => s,
    };
    PathBuf::from(format!("{}.{}", stem, ext))
}

const TOC_TITLE: &str = "Table of Contents";

/// Nested TOC list, one entry per section and per page.
pub fn table_of_contents<'a>(sections: impl IntoIterator<Item = &'a SectionDescriptor>) -> String {
    let mut out = format!("<div class=\"toc\">\n<h1>{}</h1>\n<ul>\n", TOC_TITLE);
    for section in sections {
        let _ = writeln!(
            out,
            "  <li><a href=\"#{}\">{}</a>\n    <ul>",
            section.anchor(),
            encode_text(&section.heading())
        );
        for (position, page) in section.positions() {
            let _ = writeln!(
                out,
                "      <li><a href=\"#{}\">{} {}</a></li>",
                position.anchor(),
                position,
                encode_text(&page.title)
            );
        }
        out.push_str("    </ul>\n  </li>\n");
    }
    out.push_str("</ul>\n</div>\n");
    out
}

/// Title anchors (`#getting-started`) that rewritten links point at, one per
/// page, unique across the book.
#[derive(Debug, Default)]
pub struct PageAnchors {
    by_position: HashMap<PagePosition, String>,
}

impl PageAnchors {
    pub fn for_book(book: &Book) -> Self {
        let mut taken: HashSet<String> = HashSet::new();
        for section in book.sections() {
            taken.insert(section.anchor());
            taken.extend(section.positions().map(|(position, _)| position.anchor()));
        }

        let mut by_position = HashMap::new();
        for section in book.sections() {
            for (position, page) in section.positions() {
                let base = anchor_slug(&page.title);
                if base.is_empty() {
                    continue;
                }
                let mut anchor = base.clone();
                let mut n = 2;
                while taken.contains(&anchor) || is_generated_id(&anchor) {
                    anchor = format!("{}-{}", base, n);
                    n += 1;
                }
                taken.insert(anchor.clone());
                by_position.insert(position, anchor);
            }
        }
        Self { by_position }
    }

    pub fn get(&self, position: PagePosition) -> Option<&str> {
        self.by_position.get(&position).map(String::as_str)
    }
}

/// `idN` belongs to the normalizer.
fn is_generated_id(anchor: &str) -> bool {
    anchor
        .strip_prefix("id")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// One page block; `None` when the fragment is empty.
fn page_block(fragment: &NormalizedFragment, anchors: &PageAnchors) -> Option<String> {
    if fragment.is_empty() {
        warn!(
            "No content for {} \"{}\", leaving it out",
            fragment.position, fragment.title
        );
        return None;
    }
    let mut attrs = String::new();
    if let Some(anchor) = anchors.get(fragment.position) {
        let _ = write!(attrs, " id=\"{}\"", anchor);
    }
    if !fragment.position.is_first_in_section() {
        attrs.push_str(" class=\"section-break\"");
    }
    Some(format!(
        "<div{}>\n<h2 id=\"{}\">{} {}</h2>\n{}\n</div>\n",
        attrs,
        fragment.position.anchor(),
        fragment.position,
        encode_text(&fragment.title),
        fragment.body
    ))
}

fn chapter_body(chapter: &Chapter, anchors: &PageAnchors, class: &str) -> String {
    let section = &chapter.section;
    let mut out = format!(
        "<h1{} id=\"{}\">{}</h1>\n",
        class,
        section.anchor(),
        encode_text(&section.heading())
    );
    for block in chapter
        .fragments
        .iter()
        .filter_map(|fragment| page_block(fragment, anchors))
    {
        out.push_str(&block);
    }
    out
}

/// Assemble HTML documents for the selected mode.
pub fn assemble_html(book: &Book, mode: OutputMode) -> Vec<OutputDocument> {
    let toc = table_of_contents(book.sections());
    let anchors = PageAnchors::for_book(book);

    match mode {
        OutputMode::Combined => {
            let mut body = toc;
            for chapter in &book.chapters {
                body.push_str(&chapter_body(chapter, &anchors, " class=\"chapter\""));
            }
            vec![OutputDocument {
                path: book_file(book, "html"),
                title: book.title.clone(),
                contents: html_document(&book.title, &body),
            }]
        }
        OutputMode::Sections => {
            let mut docs = vec![toc_document(&toc, "html")];
            for chapter in &book.chapters {
                let title = chapter.section.heading();
                docs.push(OutputDocument {
                    path: chapter_file(&chapter.section, "html"),
                    contents: html_document(&title, &chapter_body(chapter, &anchors, "")),
                    title,
                });
            }
            docs
        }
        OutputMode::Pages => {
            let mut docs = vec![toc_document(&toc, "html")];
            for chapter in &book.chapters {
                for fragment in &chapter.fragments {
                    let Some(block) = page_block(fragment, &anchors) else {
                        continue;
                    };
                    let title = format!("{} {}", fragment.position, fragment.title);
                    docs.push(OutputDocument {
                        path: page_file(&chapter.section, fragment, "html"),
                        contents: html_document(&title, &block),
                        title,
                    });
                }
            }
            docs
        }
    }
}

fn toc_document(toc: &str, ext: &str) -> OutputDocument {
    let contents = match ext {
        "html" => html_document(TOC_TITLE, toc),
        _ => toc.to_string(),
    };
    OutputDocument {
        path: PathBuf::from(format!("00-toc.{}", ext)),
        title: TOC_TITLE.to_string(),
        contents,
    }
}

/// Markdown table of contents linking to the explicit header ids.
pub fn markdown_toc<'a>(sections: impl IntoIterator<Item = &'a SectionDescriptor>) -> String {
    let mut out = format!("# {}\n\n", TOC_TITLE);
    for section in sections {
        let _ = writeln!(out, "- [{}](#{})", section.heading(), section.anchor());
        for (position, page) in section.positions() {
            let _ = writeln!(out, "    - [{} {}](#{})", position, page.title, position.anchor());
        }
    }
    out
}

fn markdown_page(fragment: &NormalizedFragment) -> String {
    format!(
        "## {} {} {{#{}}}\n\n{}\n\n",
        fragment.position,
        fragment.title,
        fragment.position.anchor(),
        fragment.body
    )
}

fn markdown_chapter(chapter: &Chapter) -> String {
    let section = &chapter.section;
    let mut out = format!("# {} {{#{}}}\n\n", section.heading(), section.anchor());

    let last_page = section.pages.len();
    for fragment in &chapter.fragments {
        if fragment.is_empty() {
            warn!("No content for {} \"{}\", leaving it out", fragment.position, fragment.title);
            continue;
        }
        out.push_str(&markdown_page(fragment));
        if fragment.position.page < last_page {
            out.push_str("\\newpage\n\n");
        }
    }
    out
}

/// Assemble Markdown manuscript files for the selected mode.
pub fn assemble_markdown(book: &Book, mode: OutputMode) -> Vec<OutputDocument> {
    let toc = markdown_toc(book.sections());

    match mode {
        OutputMode::Combined => {
            let mut contents = toc;
            for chapter in &book.chapters {
                contents.push_str("\\newpage\n\n");
                contents.push_str(&markdown_chapter(chapter));
            }
            vec![OutputDocument {
                path: book_file(book, "md"),
                title: book.title.clone(),
                contents,
            }]
        }
        OutputMode::Sections => {
            let mut docs = vec![toc_document(&toc, "md")];
            docs.extend(book.chapters.iter().map(|chapter| OutputDocument {
                path: chapter_file(&chapter.section, "md"),
                title: chapter.section.heading(),
                contents: markdown_chapter(chapter),
            }));
            docs
        }
        OutputMode::Pages => {
            let mut docs = vec![toc_document(&toc, "md")];
            for chapter in &book.chapters {
                for fragment in chapter.fragments.iter().filter(|f| !f.is_empty()) {
                    docs.push(OutputDocument {
                        path: page_file(&chapter.section, fragment, "md"),
                        title: format!("{} {}", fragment.position, fragment.title),
                        contents: markdown_page(fragment),
                    });
                }
            }
            docs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdCounter, PageDescriptor, PagePosition};
    use regex::Regex;
    use std::collections::HashSet;

    fn fragment(section: usize, page: usize, title: &str, body: &str) -> NormalizedFragment {
        NormalizedFragment {
            body: body.to_string(),
            ..NormalizedFragment::empty(PagePosition::new(section, page), title, IdCounter::new())
        }
    }

    fn book() -> Book {
        let essentials = SectionDescriptor {
            key: "Essentials".into(),
            name: "Essentials".into(),
            number: 1,
            pages: vec![
                PageDescriptor::new("Why Nue", "why-nue"),
                PageDescriptor::new("Getting started", "getting-started"),
            ],
        };
        let tools = SectionDescriptor {
            key: "Tools".into(),
            name: "Tools".into(),
            number: 2,
            pages: vec![PageDescriptor::new("Nuekit", "nuekit")],
        };
        Book {
            title: "Learning Nue".into(),
            chapters: vec![
                Chapter {
                    section: essentials,
                    fragments: vec![
                        fragment(1, 1, "Why Nue", r#"<p id="id1">why</p>"#),
                        fragment(1, 2, "Getting started", r#"<h3 id="id2">Install</h3>"#),
                    ],
                },
                Chapter {
                    section: tools,
                    fragments: vec![fragment(2, 1, "Nuekit", "")],
                },
            ],
        }
    }

    #[test]
    fn toc_lists_every_page_including_failed_ones() {
        let toc = table_of_contents(book().sections());
        assert!(toc.contains(r##"<a href="#section1">1. Essentials</a>"##));
        assert!(toc.contains(r##"<a href="#page1-2">1.2 Getting started</a>"##));
        assert!(toc.contains(r##"<a href="#page2-1">2.1 Nuekit</a>"##));
    }

    #[test]
    fn sections_mode_writes_toc_and_chapters() {
        let docs = assemble_html(&book(), OutputMode::Sections);
        let paths: Vec<_> = docs.iter().map(|d| d.path.to_string_lossy().into_owned()).collect();
        assert_eq!(
            paths,
            vec!["00-toc.html", "chapter-01-essentials.html", "chapter-02-tools.html"]
        );

        let chapter = &docs[1].contents;
        assert!(chapter.contains(r#"<h1 id="section1">1. Essentials</h1>"#));
        assert!(chapter.contains("<div id=\"why-nue\">\n<h2 id=\"page1-1\">1.1 Why Nue</h2>"));
        assert!(chapter.contains(
            "<div id=\"getting-started\" class=\"section-break\">\n<h2 id=\"page1-2\">"
        ));
        assert!(chapter.contains("<style>"));

        // the failed page leaves an empty chapter body but a valid document
        assert!(!docs[2].contents.contains("page2-1"));
        assert!(docs[2].contents.contains(r#"<h1 id="section2">2. Tools</h1>"#));
    }

    #[test]
    fn combined_document_has_unique_ids() {
        let docs = assemble_html(&book(), OutputMode::Combined);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, PathBuf::from("learning-nue.html"));

        let re = Regex::new(r#"\sid="([^"]+)""#).unwrap();
        let ids: Vec<_> = re.captures_iter(&docs[0].contents).map(|c| c[1].to_string()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.contains(&"id2".to_string()));
    }

    #[test]
    fn pages_mode_skips_failed_pages() {
        let docs = assemble_html(&book(), OutputMode::Pages);
        let paths: Vec<_> = docs.iter().map(|d| d.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("00-toc.html"),
                PathBuf::from("01-essentials/01-why-nue.html"),
                PathBuf::from("01-essentials/02-getting-started.html"),
            ]
        );
        assert!(docs[0].contents.contains("2.1 Nuekit"));
    }

    #[test]
    fn colliding_title_anchors_get_suffixes() {
        let mut book = book();
        book.chapters[0].section.pages[1].title = "Why Nue!".into();
        book.chapters[1].section.pages[0].title = "id2".into();
        let anchors = PageAnchors::for_book(&book);

        assert_eq!(anchors.get(PagePosition::new(1, 1)), Some("why-nue"));
        assert_eq!(anchors.get(PagePosition::new(1, 2)), Some("why-nue-2"));
        assert_eq!(anchors.get(PagePosition::new(2, 1)), Some("id2-2"));
    }

    #[test]
    fn titles_are_escaped() {
        let mut book = book();
        book.chapters[0].section.pages[0].title = "<b>Bold</b>".into();
        let toc = table_of_contents(book.sections());
        assert!(toc.contains("&lt;b&gt;Bold&lt;/b&gt;"));
    }

    #[test]
    fn markdown_chapters_have_headers_and_breaks() {
        let mut book = book();
        book.chapters[0].fragments[0].body = "Intro".into();
        book.chapters[0].fragments[1].body = "### Install".into();
        let docs = assemble_markdown(&book, OutputMode::Sections);

        assert_eq!(docs[0].path, PathBuf::from("00-toc.md"));
        assert!(docs[0].contents.contains("    - [1.2 Getting started](#page1-2)"));

        assert_eq!(docs[1].path, PathBuf::from("chapter-01-essentials.md"));
        assert_eq!(
            docs[1].contents,
            "# 1. Essentials {#section1}\n\n\
             ## 1.1 Why Nue {#page1-1}\n\nIntro\n\n\\newpage\n\n\
             ## 1.2 Getting started {#page1-2}\n\n### Install\n\n"
        );
    }
}
