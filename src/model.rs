use std::fmt;
use std::ops::Range;

/// One documentation page as discovered in the structural index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub title: String,
    /// Absolute URL (rendered index) or bare slug (topics file).
    pub locator: String,
    pub desc: Option<String>,
}

impl PageDescriptor {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            desc: None,
        }
    }
}

/// A numbered top-level grouping of pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    /// Label as found in the index; used for matching and file names.
    pub key: String,
    /// Display form of the label.
    pub name: String,
    pub number: usize,
    pub pages: Vec<PageDescriptor>,
}

impl SectionDescriptor {
    pub fn anchor(&self) -> String {
        format!("section{}", self.number)
    }

    pub fn heading(&self) -> String {
        format!("{}. {}", self.number, self.name)
    }

    /// Positions of this section's pages, in source order.
    pub fn positions(&self) -> impl Iterator<Item = (PagePosition, &PageDescriptor)> {
        let section = self.number;
        self.pages
            .iter()
            .enumerate()
            .map(move |(i, page)| (PagePosition::new(section, i + 1), page))
    }
}

/// `section.page` coordinates of a page inside the composite, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PagePosition {
    pub section: usize,
    pub page: usize,
}

impl PagePosition {
    pub fn new(section: usize, page: usize) -> Self {
        Self { section, page }
    }

    pub fn anchor(&self) -> String {
        format!("page{}-{}", self.section, self.page)
    }

    pub fn is_first_in_section(&self) -> bool {
        self.page == 1
    }
}

impl fmt::Display for PagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.page)
    }
}

/// Run-wide element identifier counter.
///
/// Passed by value into the normalizer and handed back advanced, so a single
/// owner holds it for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdCounter(u64);

impl IdCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Last identifier handed out (0 if none yet).
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next_id(&mut self) -> String {
        self.0 += 1;
        format!("id{}", self.0)
    }
}

/// Normalized content of one page, ready for assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFragment {
    pub position: PagePosition,
    pub title: String,
    pub body: String,
    /// Identifiers `idN` claimed by this fragment, half-open.
    pub id_range: Range<u64>,
}

impl NormalizedFragment {
    /// Placeholder for a page whose content could not be obtained.
    pub fn empty(position: PagePosition, title: impl Into<String>, counter: IdCounter) -> Self {
        let next = counter.value() + 1;
        Self {
            position,
            title: title.into(),
            body: String::new(),
            id_range: next..next,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// A section together with the fragments of its pages, in page order.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub section: SectionDescriptor,
    pub fragments: Vec<NormalizedFragment>,
}

#[derive(Debug, Clone)]
pub struct Book {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    pub fn sections(&self) -> impl Iterator<Item = &SectionDescriptor> {
        self.chapters.iter().map(|c| &c.section)
    }
}
