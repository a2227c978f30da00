//! Checkpoint and resume for running machines.
//!
//! A checkpoint records the configuration, history and context of a
//! machine by node id, so it stays meaningful across process restarts as
//! long as the definition keeps its ids. Actors and pending delayed events
//! are not captured: restoring restarts the invocations and delayed entry
//! sends of the active nodes instead.

use crate::core::{Configuration, HistoryValue, MachineState, NodeId, NodeIndex, StateTree};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable checkpoint of a machine's state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: Uuid,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Id of the machine the checkpoint was taken from
    pub machine_id: String,

    /// Every active node
    pub configuration: Vec<NodeId>,

    /// Recorded history, keyed by history node
    pub history: BTreeMap<NodeId, Vec<NodeId>>,

    pub context: C,

    /// Whether the machine had reached a top-level final state
    pub done: bool,
}

impl<C: Clone> Checkpoint<C> {
    /// Capture `state` of a machine built from `tree`.
    pub fn capture(tree: &StateTree, state: &MachineState<C>) -> Self {
        let history = state
            .history
            .iter()
            .map(|(node, remembered)| {
                let ids = remembered.iter().map(|&n| tree.node(n).id().clone()).collect();
                (tree.node(node).id().clone(), ids)
            })
            .collect();

        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            machine_id: tree.machine_id().to_string(),
            configuration: state.configuration.ids(tree),
            history,
            context: state.context.clone(),
            done: state.done,
        }
    }
}

impl<C> Checkpoint<C> {
    /// Validate the checkpoint against `tree` and turn it back into state.
    ///
    /// Fails on a foreign machine id, an unsupported version, unknown node
    /// ids, a configuration that is not legal for the tree, or history
    /// recorded for something that is not a history node.
    pub fn into_state(self, tree: &StateTree) -> Result<MachineState<C>, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.machine_id != tree.machine_id() {
            return Err(CheckpointError::MachineMismatch {
                found: self.machine_id,
                expected: tree.machine_id().to_string(),
            });
        }

        let configuration: Configuration = self
            .configuration
            .iter()
            .map(|id| index_of(tree, id))
            .collect::<Result<_, _>>()?;
        if !configuration.is_legal(tree) {
            return Err(CheckpointError::ValidationFailed(
                "configuration is not legal for this definition".to_string(),
            ));
        }

        let mut history = HistoryValue::new();
        for (node, remembered) in &self.history {
            let index = index_of(tree, node)?;
            if !tree.node(index).is_history() {
                return Err(CheckpointError::ValidationFailed(format!(
                    "'{node}' is not a history node"
                )));
            }
            let nodes = remembered
                .iter()
                .map(|id| index_of(tree, id))
                .collect::<Result<BTreeSet<_>, _>>()?;
            history.insert(index, nodes);
        }

        Ok(MachineState {
            configuration,
            context: self.context,
            history,
            done: self.done,
            done_data: None,
        })
    }
}

fn index_of(tree: &StateTree, id: &NodeId) -> Result<NodeIndex, CheckpointError> {
    tree.index_of(id.as_str())
        .ok_or_else(|| CheckpointError::UnknownNode(id.to_string()))
}

impl<C: Serialize> Checkpoint<C> {
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }
}

impl<C: DeserializeOwned> Checkpoint<C> {
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()
    }

    fn check_version(self) -> Result<Self, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateBuilder;
    use crate::core::HistoryKind;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Ctx {
        visits: u32,
    }

    fn tree() -> StateTree {
        StateBuilder::new()
            .initial("off")
            .state("off", StateBuilder::new())
            .state(
                "on",
                StateBuilder::new()
                    .initial("low")
                    .state("hist", StateBuilder::history(HistoryKind::Shallow))
                    .state("low", StateBuilder::new())
                    .state("high", StateBuilder::new()),
            )
            .build("lamp")
            .unwrap()
    }

    fn state(tree: &StateTree, ids: &[&str]) -> MachineState<Ctx> {
        let mut state = MachineState::unstarted(Ctx { visits: 2 });
        state.configuration = tree.resolve_ids(ids, &HistoryValue::new()).unwrap();
        let on = tree.index_of("lamp.on").unwrap();
        let configuration = state.configuration.clone();
        state.history = state.history.record_exit(tree, &configuration, &[on]);
        state
    }

    #[test]
    fn capture_then_restore_preserves_state() {
        let tree = tree();
        let original = state(&tree, &["lamp.on.high"]);

        let checkpoint = Checkpoint::capture(&tree, &original);
        assert_eq!(checkpoint.machine_id, "lamp");
        assert_eq!(checkpoint.history[&NodeId::new("lamp.on.hist")], vec![NodeId::new("lamp.on.high")]);

        let json = checkpoint.to_json().unwrap();
        let restored = Checkpoint::<Ctx>::from_json(&json).unwrap().into_state(&tree).unwrap();
        assert_eq!(restored, original);

        let bytes = checkpoint.to_bytes().unwrap();
        let restored = Checkpoint::<Ctx>::from_bytes(&bytes).unwrap().into_state(&tree).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn rejects_unknown_versions() {
        let tree = tree();
        let mut checkpoint = Checkpoint::capture(&tree, &state(&tree, &["lamp.off"]));
        checkpoint.version = 99;

        let json = checkpoint.to_json().unwrap();
        let err = Checkpoint::<Ctx>::from_json(&json).unwrap_err();
        assert!(matches!(err, CheckpointError::UnsupportedVersion { found: 99, supported: 1 }));
    }

    #[test]
    fn rejects_checkpoints_of_other_machines() {
        let tree = tree();
        let mut checkpoint = Checkpoint::capture(&tree, &state(&tree, &["lamp.off"]));
        checkpoint.machine_id = "fan".into();

        assert!(matches!(
            checkpoint.into_state(&tree),
            Err(CheckpointError::MachineMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unknown_and_illegal_configurations() {
        let tree = tree();
        let good = Checkpoint::capture(&tree, &state(&tree, &["lamp.off"]));

        let mut unknown = good.clone();
        unknown.configuration.push(NodeId::new("lamp.missing"));
        assert!(matches!(
            unknown.into_state(&tree),
            Err(CheckpointError::UnknownNode(id)) if id == "lamp.missing"
        ));

        let mut illegal = good;
        illegal.configuration.push(NodeId::new("lamp.on"));
        assert!(matches!(
            illegal.into_state(&tree),
            Err(CheckpointError::ValidationFailed(_))
        ));
    }

    #[test]
    fn garbage_input_is_a_deserialization_error() {
        assert!(matches!(
            Checkpoint::<Ctx>::from_json("{ not json"),
            Err(CheckpointError::DeserializationFailed(_))
        ));
        assert!(matches!(
            Checkpoint::<Ctx>::from_bytes(&[1, 2, 3]),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }
}
