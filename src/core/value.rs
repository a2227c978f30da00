//! Tree-shaped view of a configuration.

use super::configuration::Configuration;
use super::node::{NodeIndex, NodeKind};
use super::tree::StateTree;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// The active configuration as nested keys.
///
/// A compound node with an atomic active child is a [`Leaf`](Self::Leaf);
/// anything deeper, and every parallel node, is a [`Branch`](Self::Branch).
/// Serializes to the familiar JSON shape, e.g. `{"on": {"network": "online"}}`.
///
/// # Example
///
/// ```rust
/// use harel::builder::StateBuilder;
/// use harel::core::{HistoryValue, StateValue};
///
/// let tree = StateBuilder::new()
///     .initial("on")
///     .state(
///         "on",
///         StateBuilder::new()
///             .initial("dim")
///             .state("dim", StateBuilder::new())
///             .state("bright", StateBuilder::new()),
///     )
///     .build("lamp")
///     .unwrap();
/// let configuration = tree.resolve_ids(["lamp"], &HistoryValue::new()).unwrap();
///
/// let value = StateValue::from_configuration(&tree, &configuration);
/// assert!(value.matches("on"));
/// assert!(value.matches("on.dim"));
/// assert!(!value.matches("on.bright"));
/// assert_eq!(value.to_string(), r#"{"on":"dim"}"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValue {
    Leaf(String),
    Branch(Vec<(String, StateValue)>),
}

impl StateValue {
    pub fn from_configuration(tree: &StateTree, configuration: &Configuration) -> Self {
        value_of(tree, configuration, tree.root())
    }

    /// Whether the dotted key path is active, e.g. `"on.network.online"`.
    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        self.matches_segments(&segments)
    }

    fn matches_segments(&self, segments: &[&str]) -> bool {
        let Some((head, rest)) = segments.split_first() else {
            return true;
        };
        match self {
            Self::Leaf(key) => key == head && rest.is_empty(),
            Self::Branch(entries) => entries
                .iter()
                .any(|(key, value)| key == head && value.matches_segments(rest)),
        }
    }
}

fn value_of(tree: &StateTree, configuration: &Configuration, node: NodeIndex) -> StateValue {
    let state = tree.node(node);
    let mut active = state
        .children()
        .iter()
        .copied()
        .filter(|&child| configuration.contains(child));
    match state.kind() {
        NodeKind::Compound => match active.next() {
            Some(child) if tree.node(child).is_leaf() => {
                StateValue::Leaf(tree.node(child).key().to_string())
            }
            Some(child) => StateValue::Branch(vec![(
                tree.node(child).key().to_string(),
                value_of(tree, configuration, child),
            )]),
            None => StateValue::Branch(Vec::new()),
        },
        NodeKind::Parallel => StateValue::Branch(
            active
                .map(|region| (tree.node(region).key().to_string(), value_of(tree, configuration, region)))
                .collect(),
        ),
        NodeKind::Atomic | NodeKind::Final | NodeKind::History(_) => StateValue::Branch(Vec::new()),
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(key) => serializer.serialize_str(key),
            Self::Branch(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(key) => write!(f, "\"{key}\""),
            Self::Branch(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}
