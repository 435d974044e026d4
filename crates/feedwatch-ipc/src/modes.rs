//! Detection mode catalog.
//!
//! Modes are authored as a tree of leaves and groups. The catalog flattens
//! the tree once so lookups by id never walk it again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A node in the detection mode tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DetectionMode {
    /// A selectable mode.
    Leaf { id: String, label: String },

    /// A heading grouping selectable modes.
    Group {
        id: String,
        label: String,
        children: Vec<DetectionMode>,
    },
}

/// Errors from mode lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    /// The id names no selectable mode.
    #[error("Unknown detection mode: {0}")]
    UnknownMode(String),
}

/// Flat id → label lookup over the selectable modes.
#[derive(Debug, Clone, Default)]
pub struct ModeCatalog {
    labels: HashMap<String, String>,
    order: Vec<String>,
}

impl ModeCatalog {
    /// Flatten a mode tree. Groups contribute their leaves, not themselves.
    pub fn new(tree: &[DetectionMode]) -> Self {
        let mut catalog = Self::default();
        for node in tree {
            catalog.insert(node);
        }
        catalog
    }

    fn insert(&mut self, node: &DetectionMode) {
        match node {
            DetectionMode::Leaf { id, label } => {
                if self.labels.insert(id.clone(), label.clone()).is_none() {
                    self.order.push(id.clone());
                }
            }
            DetectionMode::Group { children, .. } => {
                for child in children {
                    self.insert(child);
                }
            }
        }
    }

    /// The modes the default monitor ships with.
    pub fn builtin() -> Self {
        let leaf = |id: &str, label: &str| DetectionMode::Leaf {
            id: id.to_string(),
            label: label.to_string(),
        };
        Self::new(&[
            leaf("general", "General detection"),
            DetectionMode::Group {
                id: "security".to_string(),
                label: "Security".to_string(),
                children: vec![
                    leaf("person", "Person detection"),
                    leaf("intrusion", "Intrusion detection"),
                ],
            },
            DetectionMode::Group {
                id: "traffic".to_string(),
                label: "Traffic".to_string(),
                children: vec![leaf("vehicle", "Vehicle detection")],
            },
            leaf("animal", "Animal detection"),
        ])
    }

    /// Label for a selectable mode.
    pub fn label(&self, id: &str) -> Result<&str, ModeError> {
        self.labels
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| ModeError::UnknownMode(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.labels.contains_key(id)
    }

    /// Selectable mode ids in authoring order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_flatten_to_leaves() {
        let catalog = ModeCatalog::builtin();

        assert!(catalog.contains("person"));
        assert!(catalog.contains("vehicle"));
        assert!(!catalog.contains("security"));
        assert_eq!(catalog.label("intrusion"), Ok("Intrusion detection"));
        assert_eq!(
            catalog.ids().collect::<Vec<_>>(),
            vec!["general", "person", "intrusion", "vehicle", "animal"]
        );
    }

    #[test]
    fn test_unknown_mode() {
        let catalog = ModeCatalog::builtin();
        assert_eq!(
            catalog.label("traffic"),
            Err(ModeError::UnknownMode("traffic".to_string()))
        );
    }

    #[test]
    fn test_tree_deserializes_from_tagged_json() {
        let json = r#"[
            {"kind": "leaf", "id": "a", "label": "A"},
            {"kind": "group", "id": "g", "label": "G", "children": [
                {"kind": "leaf", "id": "b", "label": "B"}
            ]}
        ]"#;
        let tree: Vec<DetectionMode> = serde_json::from_str(json).unwrap();
        let catalog = ModeCatalog::new(&tree);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.label("b"), Ok("B"));
    }
}
