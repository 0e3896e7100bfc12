//! Genesis data loading.
//!
//! The genesis file is a JSON array of `(space, key, value)` triples with
//! hex-encoded bytes. The metadata space must end up holding the genesis
//! public key; the controller refuses to open otherwise.

use anyhow::{Context, Result};
use meridian_crypto::{sha256, SecretKey};
use meridian_execution::state::{make_genesis_data, GenesisData, GenesisEntry};
use meridian_state::ObjectSpace;
use meridian_types::protocol::Account;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct SpaceFile {
    system: bool,
    id: u32,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
struct EntryFile {
    space: SpaceFile,
    key: String,
    value: String,
}

fn decode_account(hex_address: &Option<String>) -> Result<Account> {
    match hex_address {
        None => Ok(Account::ZERO),
        Some(encoded) => {
            let bytes = hex::decode(encoded).context("address is not valid hex")?;
            Account::from_bytes(&bytes).context("address must be 33 bytes")
        }
    }
}

/// Load genesis data from a JSON file.
pub fn load(path: &Path) -> Result<GenesisData> {
    let contents = std::fs::read_to_string(path)?;
    let entries: Vec<EntryFile> = serde_json::from_str(&contents)?;

    entries
        .into_iter()
        .map(|entry| {
            let address = decode_account(&entry.space.address)?;
            let space = if entry.space.system {
                ObjectSpace::system(entry.space.id)
            } else {
                ObjectSpace::program(entry.space.id, address)
            };
            Ok(GenesisEntry {
                space,
                key: hex::decode(&entry.key).context("key is not valid hex")?,
                value: hex::decode(&entry.value).context("value is not valid hex")?,
            })
        })
        .collect()
}

/// The development genesis: a key pair derived from `sha256("genesis")`.
pub fn development() -> GenesisData {
    let secret = match SecretKey::from_seed(&sha256("genesis")) {
        Ok(secret) => secret,
        Err(e) => panic!("development genesis key derivation failed: {e}"),
    };
    make_genesis_data(&secret.public_key().to_bytes())
}
