//! Injectable synonym table for the duplicate cascade.
//!
//! Groups are many-to-one equivalence classes; membership is tested on the
//! normalized form, so case and whitespace variants fall into the same class.

use std::collections::HashMap;

use super::normalize::normalize_label;

/// Built-in equivalence classes for common short-form labels.
const DEFAULT_GROUPS: &[&[&str]] = &[
    &["ai", "artificial intelligence"],
    &["ml", "machine learning"],
    &["nlp", "natural language processing"],
    &["llm", "large language model", "large language models"],
    &["js", "javascript"],
    &["ts", "typescript"],
    &["k8s", "kubernetes"],
    &["db", "database", "databases"],
    &["ux", "user experience"],
    &["ui", "user interface"],
    &["crypto", "cryptocurrency"],
    &["vr", "virtual reality"],
    &["ar", "augmented reality"],
    &["iot", "internet of things"],
    &["devops", "dev ops"],
];

/// Equivalence-class table over normalized labels.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    class_by_label: HashMap<String, usize>,
}

impl SynonymTable {
    /// Build a table from explicit groups. Labels are normalized on insert;
    /// a label already claimed by an earlier group keeps its first class.
    #[must_use]
    pub fn new<G, L>(groups: G) -> Self
    where
        G: IntoIterator<Item = L>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        let mut class_by_label = HashMap::new();
        for (class_id, group) in groups.into_iter().enumerate() {
            for label in group {
                let normalized = normalize_label(label.as_ref());
                if normalized.is_empty() {
                    continue;
                }
                class_by_label.entry(normalized).or_insert(class_id);
            }
        }
        Self { class_by_label }
    }

    /// Table preloaded with the built-in classes.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_GROUPS.iter().copied())
    }

    /// Whether two labels map into the same equivalence class.
    /// Symmetric by construction.
    #[must_use]
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        let class_a = self.class_by_label.get(&normalize_label(a));
        let class_b = self.class_by_label.get(&normalize_label(b));
        matches!((class_a, class_b), (Some(x), Some(y)) if x == y)
    }
}
