use anyhow::{anyhow, Result};
use colored::*;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::assembler::OutputDocument;
use crate::browser::BrowserSession;
use crate::links::{LinkRewriter, LinkStats};
use crate::pdf_merger::PdfMerger;

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    fs::write(path, contents)
        .await
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))
}

/// Write assembled documents under `out_dir`, returning the written paths.
pub async fn write_documents(out_dir: &Path, docs: &[OutputDocument]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(docs.len());
    for doc in docs {
        let path = out_dir.join(&doc.path);
        write_file(&path, doc.contents.as_bytes()).await?;
        info!("  ✓ Saved {}", path.display().to_string().blue());
        written.push(path);
    }
    Ok(written)
}

/// Print each HTML document to a PDF next to where the HTML would go.
pub async fn write_pdfs(
    session: &BrowserSession,
    out_dir: &Path,
    docs: &[OutputDocument],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(docs.len());
    for doc in docs {
        let path = out_dir.join(doc.path.with_extension("pdf"));
        info!("  Printing \"{}\"", doc.title);
        let pdf = session
            .render_pdf(&doc.contents)
            .await
            .map_err(|e| anyhow!("Failed to print \"{}\": {}", doc.title, e))?;
        write_file(&path, &pdf).await?;
        info!("  ✓ Saved {}", path.display().to_string().blue());
        written.push(path);
    }
    Ok(written)
}

/// Merge PDFs into `output` in the given order.
pub async fn merge_pdfs(paths: &[PathBuf], output: &Path) -> Result<()> {
    let mut merger = PdfMerger::new();
    for path in paths {
        if let Err(e) = merger.add_pdf(path).await {
            warn!("Skipping {}: {}", path.display(), e);
        }
    }
    merger.save(output).await?;
    info!(
        "Merged {} PDFs into {}",
        merger.len(),
        output.display().to_string().green()
    );
    Ok(())
}

/// Rewrite internal links of an HTML file in place.
pub async fn rewrite_file(path: &Path, rewriter: &LinkRewriter) -> Result<LinkStats> {
    let html = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    let (fixed, stats) = rewriter.rewrite(&html);
    if fixed != html {
        write_file(path, fixed.as_bytes()).await?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkMap;

    #[tokio::test]
    async fn writes_nested_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = vec![
            OutputDocument {
                path: PathBuf::from("00-toc.html"),
                title: "Table of Contents".into(),
                contents: "<p>toc</p>".into(),
            },
            OutputDocument {
                path: PathBuf::from("01-essentials/01-why-nue.html"),
                title: "1.1 Why Nue".into(),
                contents: "<p>why</p>".into(),
            },
        ];

        let written = write_documents(dir.path(), &docs).await.unwrap();
        assert_eq!(written.len(), 2);
        let nested = std::fs::read_to_string(dir.path().join("01-essentials/01-why-nue.html")).unwrap();
        assert_eq!(nested, "<p>why</p>");
    }

    #[tokio::test]
    async fn rewrite_file_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.html");
        std::fs::write(&path, r#"<a href="/docs/getting-started">go</a>"#).unwrap();

        let rewriter = LinkRewriter::new(LinkMap::builtin(), "/docs/", "https://nuejs.org/docs/").unwrap();
        let first = rewrite_file(&path, &rewriter).await.unwrap();
        let second = rewrite_file(&path, &rewriter).await.unwrap();

        assert_eq!(first.internal, 1);
        assert_eq!(second.total(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r##"<a href="#getting-started">go</a>"##
        );
    }

    #[tokio::test]
    async fn unwritable_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let docs = vec![OutputDocument {
            path: PathBuf::from("nested/doc.html"),
            title: "doc".into(),
            contents: String::new(),
        }];
        assert!(write_documents(&blocker, &docs).await.is_err());
    }
}
