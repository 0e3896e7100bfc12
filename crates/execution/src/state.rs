//! Well-known object spaces, keys and chain-level constants.

use crate::resource_meter::ResourceLimits;
use meridian_crypto::Digest;
use meridian_state::ObjectSpace;

/// System object spaces.
pub mod space {
    use super::ObjectSpace;

    /// Chain metadata: genesis key, head block.
    pub fn metadata() -> ObjectSpace {
        ObjectSpace::system(0)
    }

    /// Uploaded program bytecode, keyed by program account:
    /// `sha256(bytecode) || bytecode`.
    pub fn program_data() -> ObjectSpace {
        ObjectSpace::system(1)
    }

    /// Account nonces, keyed by account, little-endian u64.
    pub fn transaction_nonce() -> ObjectSpace {
        ObjectSpace::system(2)
    }
}

/// Well-known keys inside the metadata space.
pub mod key {
    /// The 32-byte Ed25519 public key authorized to sign blocks.
    pub const GENESIS_KEY: &[u8] = b"genesis_key";

    /// The timestamp of the block that produced this state, little-endian
    /// u64 milliseconds.
    pub const HEAD_BLOCK: &[u8] = b"head_block";
}

/// Depth below head at which nodes are committed.
pub const IRREVERSIBILITY_WINDOW: u64 = 60;

/// Reference resource schedule.
pub const DEFAULT_ACCOUNT_RESOURCES: u64 = 1_000_000_000;
const DEFAULT_DISK_STORAGE_LIMIT: u64 = 409_600;
const DEFAULT_DISK_STORAGE_COST: u64 = 10;
const DEFAULT_NETWORK_BANDWIDTH_LIMIT: u64 = 1_048_576;
const DEFAULT_NETWORK_BANDWIDTH_COST: u64 = 5;
const DEFAULT_COMPUTE_BANDWIDTH_LIMIT: u64 = 100_000_000;
const DEFAULT_COMPUTE_BANDWIDTH_COST: u64 = 1;

/// The resource limits a block application runs under.
pub fn default_resource_limits() -> ResourceLimits {
    ResourceLimits {
        disk_storage_limit: DEFAULT_DISK_STORAGE_LIMIT,
        disk_storage_cost: DEFAULT_DISK_STORAGE_COST,
        network_bandwidth_limit: DEFAULT_NETWORK_BANDWIDTH_LIMIT,
        network_bandwidth_cost: DEFAULT_NETWORK_BANDWIDTH_COST,
        compute_bandwidth_limit: DEFAULT_COMPUTE_BANDWIDTH_LIMIT,
        compute_bandwidth_cost: DEFAULT_COMPUTE_BANDWIDTH_COST,
    }
}

/// Summary of the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    /// Head block id.
    pub id: Digest,
    /// Head height (state revision).
    pub height: u64,
    /// Parent block id.
    pub previous: Digest,
    /// Merkle root of the head state.
    pub state_merkle_root: Digest,
    /// Head block timestamp, milliseconds since epoch.
    pub time: u64,
    /// Height below which blocks are irreversible.
    pub last_irreversible_block: u64,
}

/// One genesis object: a `(space, key, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisEntry {
    pub space: ObjectSpace,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The ordered genesis object set. Must contain
/// `metadata[genesis_key] = public key`.
pub type GenesisData = Vec<GenesisEntry>;

/// A minimal genesis data set binding the block-signing public key.
pub fn make_genesis_data(genesis_public_key: &[u8; 32]) -> GenesisData {
    vec![GenesisEntry {
        space: space::metadata(),
        key: key::GENESIS_KEY.to_vec(),
        value: genesis_public_key.to_vec(),
    }]
}
