use crate::NodeId;
use thiserror::Error;

/// Errors raised by the state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// A merge delta was created from parents with conflicting histories.
    #[error("conflicting parents")]
    ConflictingParents,
    /// A delta with this id is already indexed.
    #[error("duplicate state node id {}", hex::encode(.0))]
    DuplicateNode(NodeId),
}
