use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{PageDescriptor, SectionDescriptor};
use crate::structure::SectionMap;

/// Section ordering strategy.
///
/// Priority sections come first in the listed order, then every other section
/// in discovery order, then the designated trailing section. Labels compare
/// case-insensitively so the same order works for `Essentials` and `essentials`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SectionOrder {
    pub priority: Vec<String>,
    pub last: Option<String>,
    /// Groupings in the index that are not book sections.
    pub excluded: Vec<String>,
}

impl Default for SectionOrder {
    fn default() -> Self {
        Self {
            priority: ["Essentials", "Tools", "Developing", "Concepts"]
                .map(String::from)
                .to_vec(),
            last: Some("Reference".to_string()),
            excluded: vec!["Topics".to_string()],
        }
    }
}

fn same_label(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl SectionOrder {
    fn is_last(&self, key: &str) -> bool {
        self.last.as_deref().is_some_and(|last| same_label(last, key))
    }

    fn is_priority(&self, key: &str) -> bool {
        self.priority.iter().any(|p| same_label(p, key))
    }

    fn is_excluded(&self, key: &str) -> bool {
        self.excluded.iter().any(|e| same_label(e, key))
    }

    /// Order and number the discovered sections. Numbers are 1-based final
    /// positions; sections without pages are left out before numbering.
    pub fn apply(&self, sections: SectionMap) -> Vec<SectionDescriptor> {
        let mut remaining: Vec<(String, Vec<PageDescriptor>)> = sections
            .into_iter()
            .filter(|(key, _)| !self.is_excluded(key))
            .collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        for wanted in &self.priority {
            if let Some(idx) = remaining.iter().position(|(key, _)| same_label(wanted, key)) {
                ordered.push(remaining.remove(idx));
            }
        }

        let (trailing, residual): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(|(key, _)| self.is_last(key));
        ordered.extend(residual);
        ordered.extend(trailing);

        ordered
            .into_iter()
            .filter(|(key, pages)| {
                if pages.is_empty() {
                    debug!("Skipping empty section \"{}\"", key);
                }
                !pages.is_empty()
            })
            .enumerate()
            .map(|(i, (key, pages))| SectionDescriptor {
                name: display_name(&key),
                key,
                number: i + 1,
                pages,
            })
            .collect()
    }
}

/// `essentials` → `Essentials`.
pub fn display_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
