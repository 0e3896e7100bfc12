//! The three-category error model of the execution engine.
//!
//! [`Reversion`] rolls a transaction's sub-node back while the block keeps
//! going. [`ControllerError`] fails the enclosing block or transaction whole.
//! [`Error::Exit`] carries a program's chosen exit code so a read-only call
//! can surface it as data while operation dispatch promotes it to a
//! reversion. Programmer errors (empty-stack access, committing a root,
//! writing to a complete delta) are panics, never values of these types.

use thiserror::Error;

/// A stable, machine-readable string code for an error variant.
pub trait ErrorCode {
    /// The unique, stable identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// A program-signalled abort: the transaction's sub-node is dropped, its
/// receipt is marked reverted, and the enclosing block continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Reversion {
    /// Generic failure inside a program or host call.
    #[error("failure")]
    Failure,
    /// The callee is not a program account or does not exist.
    #[error("invalid program")]
    InvalidProgram,
    /// An emitted event had an empty, oversized or non-UTF-8 name.
    #[error("invalid event name")]
    InvalidEventName,
    /// An account argument had the wrong shape.
    #[error("invalid account")]
    InvalidAccount,
    /// A privileged entry point was invoked through an unprivileged route.
    #[error("insufficient privileges")]
    InsufficientPrivileges,
    /// The payer session could not cover a resource charge.
    #[error("insufficient resources")]
    InsufficientResources,
    /// The operation tag is not recognized.
    #[error("unknown operation")]
    UnknownOperation,
    /// A state-changing capability was used in a read-only context.
    #[error("read only context")]
    ReadOnlyContext,
    /// The call stack exceeded its configured maximum depth.
    #[error("stack overflow")]
    StackOverflow,
    /// A stream operation addressed a descriptor it cannot use.
    #[error("bad file descriptor")]
    BadFileDescriptor,
}

impl ErrorCode for Reversion {
    fn code(&self) -> &'static str {
        match self {
            Self::Failure => "REVERSION_FAILURE",
            Self::InvalidProgram => "REVERSION_INVALID_PROGRAM",
            Self::InvalidEventName => "REVERSION_INVALID_EVENT_NAME",
            Self::InvalidAccount => "REVERSION_INVALID_ACCOUNT",
            Self::InsufficientPrivileges => "REVERSION_INSUFFICIENT_PRIVILEGES",
            Self::InsufficientResources => "REVERSION_INSUFFICIENT_RESOURCES",
            Self::UnknownOperation => "REVERSION_UNKNOWN_OPERATION",
            Self::ReadOnlyContext => "REVERSION_READ_ONLY_CONTEXT",
            Self::StackOverflow => "REVERSION_STACK_OVERFLOW",
            Self::BadFileDescriptor => "REVERSION_BAD_FILE_DESCRIPTOR",
        }
    }
}

/// A structural or consensus failure. Blocks fail whole; transactions fail
/// whole with no nonce advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// A required authority did not sign off.
    #[error("authorization failure")]
    AuthorizationFailure,
    /// The transaction nonce is not the account nonce plus one.
    #[error("invalid nonce")]
    InvalidNonce,
    /// A signature failed Ed25519 verification or the signer is wrong.
    #[error("invalid signature")]
    InvalidSignature,
    /// The block failed structural validation.
    #[error("malformed block")]
    MalformedBlock,
    /// The transaction failed structural validation.
    #[error("malformed transaction")]
    MalformedTransaction,
    /// The payer cannot cover the declared resource limit.
    #[error("insufficient resources")]
    InsufficientResources,
    /// The block's previous id is not a known, final state node.
    #[error("unknown previous block")]
    UnknownPreviousBlock,
    /// The block height does not follow its parent.
    #[error("unexpected height")]
    UnexpectedHeight,
    /// A state node for the block could not be created.
    #[error("block state error")]
    BlockStateError,
    /// The declared state Merkle root does not match the parent's.
    #[error("state merkle mismatch")]
    StateMerkleMismatch,
    /// The transaction names a different network.
    #[error("network id mismatch")]
    NetworkIdMismatch,
    /// The block timestamp is outside the accepted window.
    #[error("timestamp out of bounds")]
    TimestampOutOfBounds,
    /// The network bandwidth budget was exhausted.
    #[error("network bandwidth limit exceeded")]
    NetworkBandwidthLimitExceeded,
    /// The compute bandwidth budget was exhausted.
    #[error("compute bandwidth limit exceeded")]
    ComputeBandwidthLimitExceeded,
    /// The disk storage budget was exhausted.
    #[error("disk storage limit exceeded")]
    DiskStorageLimitExceeded,
    /// The block's height precedes the irreversible root.
    #[error("pre-irreversibility block")]
    PreIrreversibilityBlock,
}

impl ErrorCode for ControllerError {
    fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationFailure => "CONTROLLER_AUTHORIZATION_FAILURE",
            Self::InvalidNonce => "CONTROLLER_INVALID_NONCE",
            Self::InvalidSignature => "CONTROLLER_INVALID_SIGNATURE",
            Self::MalformedBlock => "CONTROLLER_MALFORMED_BLOCK",
            Self::MalformedTransaction => "CONTROLLER_MALFORMED_TRANSACTION",
            Self::InsufficientResources => "CONTROLLER_INSUFFICIENT_RESOURCES",
            Self::UnknownPreviousBlock => "CONTROLLER_UNKNOWN_PREVIOUS_BLOCK",
            Self::UnexpectedHeight => "CONTROLLER_UNEXPECTED_HEIGHT",
            Self::BlockStateError => "CONTROLLER_BLOCK_STATE_ERROR",
            Self::StateMerkleMismatch => "CONTROLLER_STATE_MERKLE_MISMATCH",
            Self::NetworkIdMismatch => "CONTROLLER_NETWORK_ID_MISMATCH",
            Self::TimestampOutOfBounds => "CONTROLLER_TIMESTAMP_OUT_OF_BOUNDS",
            Self::NetworkBandwidthLimitExceeded => "CONTROLLER_NETWORK_BANDWIDTH_LIMIT_EXCEEDED",
            Self::ComputeBandwidthLimitExceeded => "CONTROLLER_COMPUTE_BANDWIDTH_LIMIT_EXCEEDED",
            Self::DiskStorageLimitExceeded => "CONTROLLER_DISK_STORAGE_LIMIT_EXCEEDED",
            Self::PreIrreversibilityBlock => "CONTROLLER_PRE_IRREVERSIBILITY_BLOCK",
        }
    }
}

/// The unified execution error: one of the two failure categories, or a
/// program's own exit code carried as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// See [`Reversion`].
    #[error("reversion: {0}")]
    Reversion(#[from] Reversion),
    /// See [`ControllerError`].
    #[error("controller: {0}")]
    Controller(#[from] ControllerError),
    /// The program exited with a nonzero code.
    #[error("program exited with code {0}")]
    Exit(i32),
}

impl Error {
    /// Whether this error reverts the transaction rather than failing it.
    pub fn is_reversion(&self) -> bool {
        matches!(self, Error::Reversion(_))
    }

    /// Whether this error is a structural or consensus failure.
    pub fn is_controller(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Whether this error carries a program exit code.
    pub fn is_exit(&self) -> bool {
        matches!(self, Error::Exit(_))
    }

    /// Whether a running program must be aborted immediately rather than
    /// being handed an errno: resource exhaustion cannot be retried from
    /// inside the sandbox.
    pub fn halts(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::InsufficientResources)
                | Error::Controller(ControllerError::NetworkBandwidthLimitExceeded)
                | Error::Controller(ControllerError::ComputeBandwidthLimitExceeded)
                | Error::Controller(ControllerError::DiskStorageLimitExceeded)
                | Error::Reversion(Reversion::InsufficientResources)
        )
    }
}
