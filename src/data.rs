use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Stable identifier of one dataset item.
pub type ExampleId = usize;

/// An opaque ordered dataset with stable IDs.
///
/// `fetch` must preserve the requested ID order; IDs are stable for the
/// lifetime of the loader. Back-ends beyond the built-ins (files, stores,
/// generators) implement this trait.
pub trait DataLoader {
    type Instance;

    fn all_ids(&self) -> Vec<ExampleId>;

    fn fetch(&self, ids: &[ExampleId]) -> Result<Vec<Self::Instance>>;

    fn size(&self) -> usize;
}

/// Dataset held in memory; IDs are positions.
#[derive(Debug, Clone)]
pub struct InMemoryLoader<T> {
    items: Vec<T>,
}

impl<T> InMemoryLoader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T: Clone> DataLoader for InMemoryLoader<T> {
    type Instance = T;

    fn all_ids(&self) -> Vec<ExampleId> {
        (0..self.items.len()).collect()
    }

    fn fetch(&self, ids: &[ExampleId]) -> Result<Vec<T>> {
        ids.iter()
            .map(|&id| {
                self.items.get(id).cloned().ok_or_else(|| {
                    anyhow!("unknown example id {id} (dataset has {} items)", self.items.len())
                })
            })
            .collect()
    }

    fn size(&self) -> usize {
        self.items.len()
    }
}

impl<T> FromIterator<T> for InMemoryLoader<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Loads a JSON-lines file into an [`InMemoryLoader`], one value per line.
/// Blank lines are skipped.
#[tracing::instrument(name = "gepa.data.load_jsonl", level = "debug", skip(path), fields(path = %path.display()))]
pub fn load_jsonl(path: &Path) -> Result<InMemoryLoader<serde_json::Value>> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let items: Vec<serde_json::Value> = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).with_context(|| format!("parsing {}", path.display()))
        })
        .collect::<Result<_>>()?;

    debug!(examples_loaded = items.len(), "jsonl examples loaded");
    Ok(InMemoryLoader::new(items))
}
