//! Object spaces: disjoint namespaces inside a state node.

use meridian_types::protocol::{Account, ACCOUNT_LEN};

/// Serialized length of an [`ObjectSpace`]: flag, id, address.
pub const SPACE_LEN: usize = 1 + 4 + ACCOUNT_LEN;

/// Addresses one namespace: a `(system, id)` pair plus, for program-scoped
/// spaces, the owning program's account. Compound keys are the serialized
/// space followed by the caller's key, so programs cannot read or overwrite
/// each other's storage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ObjectSpace {
    /// Whether this is a system-owned space.
    pub system: bool,
    /// Space id, unique within the system/program scope.
    pub id: u32,
    /// The owning program, zero for system spaces.
    pub address: Account,
}

impl ObjectSpace {
    /// A system space with the given id.
    pub fn system(id: u32) -> Self {
        Self {
            system: true,
            id,
            address: Account::ZERO,
        }
    }

    /// A program-scoped space owned by `address`.
    pub fn program(id: u32, address: Account) -> Self {
        Self {
            system: false,
            id,
            address,
        }
    }

    /// The fixed 38-byte layout: flag byte, little-endian id, address.
    pub fn to_bytes(&self) -> [u8; SPACE_LEN] {
        let mut bytes = [0u8; SPACE_LEN];
        bytes[0] = self.system as u8;
        bytes[1..5].copy_from_slice(&self.id.to_le_bytes());
        bytes[5..].copy_from_slice(self.address.as_bytes());
        bytes
    }

    /// `space_bytes || key`.
    pub fn compound_key(&self, key: &[u8]) -> Vec<u8> {
        let mut compound = Vec::with_capacity(SPACE_LEN + key.len());
        compound.extend_from_slice(&self.to_bytes());
        compound.extend_from_slice(key);
        compound
    }
}
