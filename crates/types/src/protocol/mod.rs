//! Protocol data model: accounts, blocks, transactions, receipts.
//!
//! All fields are bit-exact under the canonical codec; block and transaction
//! ids are SHA-256 digests of the canonical encoding of their signable
//! fields, and signatures are always made over those ids.

use crate::codec::to_bytes_canonical;
use meridian_crypto::{sha256, Digest, Signature};
use parity_scale_codec::{Decode, Encode};

/// Length of a serialized account: one type tag plus a 32-byte payload.
pub const ACCOUNT_LEN: usize = 33;

const TAG_USER: u8 = 0;
const TAG_PROGRAM: u8 = 1;
const TAG_SYSTEM_PROGRAM: u8 = 2;

/// The kind of entity an [`Account`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// Derived from an Ed25519 public key; can sign transactions.
    User,
    /// Derived from an Ed25519 public key; addressable for execution.
    Program,
    /// A well-known built-in program addressed by name.
    SystemProgram,
    /// An unrecognized type tag.
    Unknown,
}

/// A 33-byte tagged identifier for users, programs and system programs.
///
/// The first byte is the type tag; the remaining 32 bytes are the payload
/// (a public key, or a zero-padded name for system programs).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Account(pub [u8; ACCOUNT_LEN]);

impl Account {
    /// The all-zero account, used for "no payee".
    pub const ZERO: Account = Account([0u8; ACCOUNT_LEN]);

    /// A user account for an Ed25519 public key.
    pub fn user(public_key: [u8; 32]) -> Self {
        Self::tagged(TAG_USER, public_key)
    }

    /// A program account for an Ed25519 public key.
    pub fn program(public_key: [u8; 32]) -> Self {
        Self::tagged(TAG_PROGRAM, public_key)
    }

    /// A system program account for a well-known name of at most 32 bytes.
    pub fn system_program(name: &str) -> Self {
        assert!(name.len() <= 32, "system program name exceeds 32 bytes");
        let mut payload = [0u8; 32];
        payload[..name.len()].copy_from_slice(name.as_bytes());
        Self::tagged(TAG_SYSTEM_PROGRAM, payload)
    }

    fn tagged(tag: u8, payload: [u8; 32]) -> Self {
        let mut bytes = [0u8; ACCOUNT_LEN];
        bytes[0] = tag;
        bytes[1..].copy_from_slice(&payload);
        Account(bytes)
    }

    /// The account's type tag.
    pub fn account_type(&self) -> AccountType {
        match self.0[0] {
            TAG_USER => AccountType::User,
            TAG_PROGRAM => AccountType::Program,
            TAG_SYSTEM_PROGRAM => AccountType::SystemProgram,
            _ => AccountType::Unknown,
        }
    }

    /// Whether this account is executable (program or system program).
    pub fn is_program(&self) -> bool {
        matches!(
            self.account_type(),
            AccountType::Program | AccountType::SystemProgram
        )
    }

    /// The 32-byte payload after the type tag.
    pub fn payload(&self) -> &[u8] {
        &self.0[1..]
    }

    /// The full 33-byte serialization.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_LEN] {
        &self.0
    }

    /// Parse an account from a 33-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; ACCOUNT_LEN] = bytes.try_into().ok()?;
        Some(Account(array))
    }

    /// The user account with the same payload. First upload of a program
    /// must be authorized by this account.
    pub fn user_counterpart(&self) -> Account {
        let mut bytes = self.0;
        bytes[0] = TAG_USER;
        Account(bytes)
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for Account {
    fn default() -> Self {
        Account::ZERO
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Account({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Account {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Input handed to a program invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ProgramInput {
    /// Bytes readable through the program's stdin stream.
    pub stdin: Vec<u8>,
    /// Argument strings exposed through the argv interface.
    pub arguments: Vec<String>,
}

/// Captured result of a program invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ProgramOutput {
    /// The program's exit code; zero is success.
    pub code: i32,
    /// Bytes the program wrote to stdout.
    pub stdout: Vec<u8>,
    /// Bytes the program wrote to stderr.
    pub stderr: Vec<u8>,
}

/// A completed invocation as recorded by the frame recorder, sufficient to
/// reconstruct the call post-mortem.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ProgramFrame {
    /// The invoked program.
    pub id: Account,
    /// Call-stack depth at the time of execution (1 = outermost).
    pub depth: u32,
    /// Argument strings.
    pub arguments: Vec<String>,
    /// The stdin bytes handed to the frame.
    pub stdin: Vec<u8>,
    /// The program's exit code.
    pub code: i32,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl ProgramFrame {
    /// The output triple of this frame.
    pub fn output(&self) -> ProgramOutput {
        ProgramOutput {
            code: self.code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// One operation of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Operation {
    /// Store program bytecode under a program account.
    UploadProgram {
        /// The program account the bytecode binds to.
        id: Account,
        /// Raw WASM bytecode.
        bytecode: Vec<u8>,
    },
    /// Invoke a program.
    CallProgram {
        /// The program or system program to invoke.
        id: Account,
        /// Stdin and arguments for the invocation.
        input: ProgramInput,
    },
}

/// One signature authorizing a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Authorization {
    /// The signing user account.
    pub signer: Account,
    /// Ed25519 signature over the transaction id.
    pub signature: Signature,
}

/// A signed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Transaction {
    /// SHA-256 of the canonical encoding of the signable fields.
    pub id: Digest,
    /// The network this transaction is valid on.
    pub network_id: Digest,
    /// Must equal the nonce account's stored nonce plus one.
    pub nonce: u64,
    /// Resource-credit budget the payer stakes on this transaction.
    pub resource_limit: u64,
    /// The account charged for execution.
    pub payer: Account,
    /// Optional beneficiary; zero when absent. When set, carries the nonce.
    pub payee: Account,
    /// Operations applied in declared order.
    pub operations: Vec<Operation>,
    /// Signatures over the transaction id.
    pub authorizations: Vec<Authorization>,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            id: Digest::default(),
            network_id: Digest::default(),
            nonce: 0,
            resource_limit: 0,
            payer: Account::ZERO,
            payee: Account::ZERO,
            operations: Vec::new(),
            authorizations: Vec::new(),
        }
    }
}

impl Transaction {
    /// The id this transaction should carry.
    pub fn compute_id(&self) -> Digest {
        let header = (
            &self.network_id,
            self.nonce,
            self.resource_limit,
            &self.payer,
            &self.payee,
            &self.operations,
        );
        sha256(to_bytes_canonical(&header))
    }

    /// Structural validity: intact id and a non-zero payer.
    pub fn validate(&self) -> bool {
        self.id == self.compute_id() && !self.payer.is_zero()
    }
}

/// A signed block of transactions.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Block {
    /// SHA-256 of the canonical encoding of the header fields.
    pub id: Digest,
    /// Height of this block; the parent of height 1 is the zero id.
    pub height: u64,
    /// Id of the previous block.
    pub previous: Digest,
    /// Merkle root of the parent state this block builds on.
    pub state_merkle_root: Digest,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// The block producer; must match the stored genesis key.
    pub signer: Account,
    /// Ed25519 signature over the block id.
    pub signature: Signature,
    /// Transactions applied in declared order.
    pub transactions: Vec<Transaction>,
}

impl Default for Block {
    fn default() -> Self {
        Block {
            id: Digest::default(),
            height: 0,
            previous: Digest::default(),
            state_merkle_root: Digest::default(),
            timestamp: 0,
            signer: Account::ZERO,
            signature: [0u8; 64],
            transactions: Vec::new(),
        }
    }
}

impl Block {
    /// The id this block should carry.
    pub fn compute_id(&self) -> Digest {
        let header = (
            self.height,
            &self.previous,
            &self.state_merkle_root,
            self.timestamp,
            &self.signer,
        );
        sha256(to_bytes_canonical(&header))
    }

    /// Structural validity: intact id and structurally valid transactions.
    pub fn validate(&self) -> bool {
        self.id == self.compute_id() && self.transactions.iter().all(Transaction::validate)
    }
}

/// An event emitted by a program during execution.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Event {
    /// The program that emitted the event.
    pub source: Account,
    /// Event name; non-empty UTF-8, at most 128 bytes.
    pub name: String,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Accounts the event concerns.
    pub impacted: Vec<Account>,
}

/// Receipt for one applied transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct TransactionReceipt {
    /// The transaction id.
    pub id: Digest,
    /// The paying account.
    pub payer: Account,
    /// The payee, zero when absent.
    pub payee: Account,
    /// The declared resource-credit limit.
    pub resource_limit: u64,
    /// Resource credits actually charged to the payer.
    pub resource_used: u64,
    /// Disk bytes consumed.
    pub disk_storage_used: u64,
    /// Network bytes consumed.
    pub network_bandwidth_used: u64,
    /// Compute ticks consumed.
    pub compute_bandwidth_used: u64,
    /// Whether the transaction reverted (state dropped, nonce kept).
    pub reverted: bool,
    /// Events emitted by the transaction; empty when reverted.
    pub events: Vec<Event>,
    /// Log lines captured during the transaction.
    pub logs: Vec<String>,
}

/// Receipt for one applied block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct BlockReceipt {
    /// The block id.
    pub id: Digest,
    /// The block height.
    pub height: u64,
    /// Disk bytes consumed by the whole block.
    pub disk_storage_used: u64,
    /// Network bytes consumed by the whole block.
    pub network_bandwidth_used: u64,
    /// Compute ticks consumed by the whole block.
    pub compute_bandwidth_used: u64,
    /// Disk bytes charged to payers.
    pub disk_storage_charged: u64,
    /// Network bytes charged to payers.
    pub network_bandwidth_charged: u64,
    /// Compute ticks charged to payers.
    pub compute_bandwidth_charged: u64,
    /// Block-level events (not attributed to any transaction).
    pub events: Vec<Event>,
    /// Log lines captured during block application.
    pub logs: Vec<String>,
    /// Merkle root of the state after this block was applied.
    pub state_merkle_root: Digest,
    /// Per-transaction receipts in block order.
    pub transaction_receipts: Vec<TransactionReceipt>,
}
