//! # site2book
//!
//! A CLI utility to turn a documentation website into a print-ready book.
//!
//! The site's section/page hierarchy is read from its docs index, every page
//! is fetched and normalized (headings moved down, ids renumbered across the
//! whole book, non-portable elements removed), links between pages are
//! pointed inside the book, and the result is written as HTML, PDF or
//! Markdown with a numbered table of contents.
//!
//! ## Usage
//!
//! ```bash
//! site2book html https://nuejs.org/docs/ --mode combined
//! site2book pdf --mode pages --combine
//! site2book markdown
//! ```

pub mod assembler;
pub mod browser;
pub mod links;
pub mod model;
pub mod normalizer;
pub mod ordering;
mod pdf_merger;
pub mod pipeline;
pub mod profile;
pub mod source;
pub mod structure;
pub mod writer;

pub use assembler::OutputMode;
pub use links::{LinkMap, LinkRewriter};
pub use pdf_merger::PdfMerger;
pub use pipeline::{BookBuilder, RunSummary};
pub use profile::SiteProfile;
