//! The versioned state store of the Meridian engine.
//!
//! State is a DAG of copy-on-write deltas over an ordered key-value backend.
//! Reads chain through parents breadth-first, writes and tombstones stay
//! local, and nodes accumulate approval weight that finalizes their ancestors
//! once a threshold is crossed. The [`DeltaIndex`] tracks every live delta
//! plus a designated head; [`node`] wraps deltas in permanent and temporary
//! facades scoped by [`ObjectSpace`] compound keys.

pub mod backend;
pub mod database;
pub mod delta;
pub mod error;
pub mod index;
pub mod node;
pub mod space;

pub use backend::{Backend, MapBackend, SharedBackend};
pub use database::{Database, GenesisInit};
pub use delta::{SharedDelta, StateDelta};
pub use error::StateError;
pub use index::{DeltaIndex, ForkResolutionAlgorithm};
pub use node::{PermanentStateNode, StateNode, TemporaryStateNode};
pub use space::ObjectSpace;

use meridian_crypto::Digest;

/// Identifier of one state node; externally assigned, typically a block id.
pub type NodeId = Digest;

/// The null node id, permitted for transient nodes.
pub const NULL_ID: NodeId = [0u8; 32];

/// Weight contributed by one approver of a delta.
pub type ApprovalWeight = u64;
