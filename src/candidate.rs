use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A program candidate: a mapping from component name to component text.
///
/// Every candidate in a run shares the key set fixed by the seed — mutation
/// and merge replace component *values*, never keys. Keys are sorted at
/// construction so the component order is stable across the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate {
    components: IndexMap<String, String>,
}

impl Candidate {
    pub fn new<K, V>(components: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = components
            .into_iter()
            .map(|(name, text)| (name.into(), text.into()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            components: pairs.into_iter().collect(),
        }
    }

    /// Convenience for the common single-instruction program.
    pub fn single(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new([(name.into(), text.into())])
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.components.get(name).map(String::as_str)
    }

    /// Replaces the text of an existing component. Returns `false` (and
    /// leaves the candidate untouched) when the name is not a known
    /// component: the key set is frozen at seed construction.
    pub fn set(&mut self, name: &str, text: impl Into<String>) -> bool {
        match self.components.get_mut(name) {
            Some(slot) => {
                *slot = text.into();
                true
            }
            None => false,
        }
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, &str)> {
        self.components
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Candidate
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter)
    }
}
