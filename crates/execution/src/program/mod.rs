//! The program host interface and the native program registry.
//!
//! Native programs are in-process implementations of privileged system
//! programs. They see exactly the same host capabilities as WASM programs,
//! expressed through [`SystemInterface`], and exit through
//! [`ProgramError`] codes carried as [`Error::Exit`].

pub mod coin;

use meridian_types::protocol::{Account, ProgramOutput};
use meridian_types::Error;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// A stream descriptor visible to programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDescriptor {
    Stdin,
    Stdout,
    Stderr,
}

impl FileDescriptor {
    /// Map a raw WASI descriptor number.
    pub fn from_raw(fd: u32) -> Option<Self> {
        match fd {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// Exit codes a native program can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProgramError {
    InvalidArgument = 1,
    Unauthorized = 2,
    InsufficientBalance = 3,
    Overflow = 4,
    InsufficientSupply = 5,
    InvalidInstruction = 6,
}

impl ProgramError {
    /// The exit code this error surfaces as.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ProgramError> for Error {
    fn from(error: ProgramError) -> Self {
        Error::Exit(error.code())
    }
}

/// The full host capability table programs execute against.
///
/// Implemented by the execution context; object access is scoped to the
/// current frame's program.
pub trait SystemInterface {
    /// The current frame's arguments.
    fn arguments(&self) -> Vec<String>;

    /// Append to the frame's stdout or stderr. Writing to stdin is invalid.
    fn write(&mut self, fd: FileDescriptor, bytes: &[u8]) -> Result<(), Error>;

    /// Read from the frame's stdin, advancing the cursor. Reading any other
    /// descriptor is invalid. Returns the number of bytes copied.
    fn read(&mut self, fd: FileDescriptor, buffer: &mut [u8]) -> Result<usize, Error>;

    /// The object under `key`; empty on absence.
    fn get_object(&mut self, space_id: u32, key: &[u8]) -> Vec<u8>;

    /// The successor of `key` in the space.
    fn get_next_object(&mut self, space_id: u32, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// The predecessor of `key` in the space.
    fn get_prev_object(&mut self, space_id: u32, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Write an object, metering disk storage.
    fn put_object(&mut self, space_id: u32, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Remove an object, metering disk storage.
    fn remove_object(&mut self, space_id: u32, key: &[u8]) -> Result<(), Error>;

    /// Resolve authority for `account`. Never succeeds in read-only intent.
    fn check_authority(&mut self, account: &Account) -> Result<bool, Error>;

    /// The enclosing frame's program, absent at stack depth one.
    fn get_caller(&self) -> Option<Account>;

    /// Recursive invocation: push a frame, execute, pop, return the output
    /// triple.
    fn call_program(
        &mut self,
        account: &Account,
        stdin: &[u8],
        arguments: &[String],
    ) -> Result<ProgramOutput, Error>;

    /// Record a log line.
    fn log(&mut self, message: &str);

    /// Emit an event. Names are non-empty UTF-8 of at most 128 bytes.
    fn event(&mut self, name: &[u8], data: &[u8], impacted: &[Account]) -> Result<(), Error>;
}

/// A native program.
pub trait Program: Send + Sync {
    /// Execute against the host interface. `Error::Exit` carries the
    /// program's own exit code; other errors are host failures.
    fn run(&self, system: &mut dyn SystemInterface) -> Result<(), Error>;
}

static REGISTRY: Lazy<BTreeMap<Account, Box<dyn Program>>> = Lazy::new(|| {
    let mut registry: BTreeMap<Account, Box<dyn Program>> = BTreeMap::new();
    registry.insert(Account::system_program("coin"), Box::new(coin::Coin));
    registry
});

/// The in-process registry of system programs.
pub fn registry() -> &'static BTreeMap<Account, Box<dyn Program>> {
    &REGISTRY
}
