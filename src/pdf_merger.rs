use anyhow::{anyhow, Result};
use lopdf::{Document, Object, ObjectId};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Concatenates PDFs page by page, in the order they were added.
pub struct PdfMerger {
    documents: Vec<(String, Document)>,
}

impl PdfMerger {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub async fn add_pdf(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read PDF file {}: {}", path.display(), e))?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf")
            .to_string();
        self.add_bytes(name, &data)
    }

    pub fn add_bytes(&mut self, name: String, data: &[u8]) -> Result<()> {
        let document = Document::load_mem(data)
            .map_err(|e| anyhow!("Failed to parse PDF {}: {}", name, e))?;
        debug!("Loaded {} with {} pages", name, document.get_pages().len());
        self.documents.push((name, document));
        Ok(())
    }

    /// Build the merged document in memory.
    pub fn merge(&self) -> Result<Document> {
        let Some(((_, first), rest)) = self.documents.split_first() else {
            return Err(anyhow!("No PDFs added to merge"));
        };

        let mut merged = first.clone();
        let pages_id = root_pages_id(&merged)?;
        let mut page_ids: Vec<ObjectId> = merged.get_pages().into_values().collect();
        let mut max_id = merged.max_id;

        for (name, document) in rest {
            let mut copy = document.clone();
            copy.renumber_objects_with(max_id + 1);
            max_id = copy.max_id;

            let pages: Vec<ObjectId> = copy.get_pages().into_values().collect();
            debug!("Appending {} pages from {}", pages.len(), name);
            merged.objects.extend(copy.objects);
            page_ids.extend(pages);
        }
        merged.max_id = max_id;

        for page_id in &page_ids {
            if let Ok(Object::Dictionary(page)) = merged.get_object_mut(*page_id) {
                page.set("Parent", Object::Reference(pages_id));
            }
        }

        let count = page_ids.len();
        match merged.get_object_mut(pages_id) {
            Ok(Object::Dictionary(pages)) => {
                pages.set(
                    "Kids",
                    Object::Array(page_ids.into_iter().map(Object::Reference).collect()),
                );
                pages.set("Count", Object::Integer(count as i64));
            }
            _ => return Err(anyhow!("Merged PDF has no page tree")),
        }

        info!("Merged {} documents into {} pages", self.documents.len(), count);
        Ok(merged)
    }

    pub async fn save(&self, output_path: &Path) -> Result<()> {
        let mut merged = self.merge()?;

        let mut data = Vec::new();
        merged
            .save_to(&mut data)
            .map_err(|e| anyhow!("Failed to serialize merged PDF: {}", e))?;

        fs::write(output_path, data)
            .await
            .map_err(|e| anyhow!("Failed to write merged PDF to {}: {}", output_path.display(), e))?;

        Ok(())
    }
}

impl Default for PdfMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn root_pages_id(document: &Document) -> Result<ObjectId> {
    let catalog = document
        .catalog()
        .map_err(|e| anyhow!("PDF has no catalog: {}", e))?;
    match catalog.get(b"Pages") {
        Ok(Object::Reference(id)) => Ok(*id),
        _ => Err(anyhow!("PDF catalog has no page tree")),
    }
}
