//! The host capability surface a running program sees.

use meridian_types::Error;

/// The stdin descriptor.
pub const FD_STDIN: u32 = 0;
/// The stdout descriptor.
pub const FD_STDOUT: u32 = 1;
/// The stderr descriptor.
pub const FD_STDERR: u32 = 2;

/// WASI errno values surfaced to guests.
pub(crate) mod errno {
    pub const SUCCESS: i32 = 0;
    pub const BADF: i32 = 8;
    pub const INVAL: i32 = 28;
    pub const OVERFLOW: i32 = 61;
}

/// The opaque handle the execution context registers with the VM adapter.
///
/// Every host function the ABI exposes dispatches through this trait. Errors
/// that [halt](meridian_types::Error::halts) abort the running program;
/// everything else is reported to the guest as an errno.
pub trait HostApi {
    /// The current frame's arguments.
    fn arguments(&self) -> Vec<Vec<u8>>;

    /// Append `bytes` to the frame's stdout or stderr buffer.
    fn write_stream(&mut self, fd: u32, bytes: &[u8]) -> Result<(), Error>;

    /// Copy up to `buffer.len()` bytes from the frame's stdin, advancing the
    /// cursor. Returns the number of bytes copied.
    fn read_stream(&mut self, fd: u32, buffer: &mut [u8]) -> Result<usize, Error>;

    /// The enclosing frame's program id; empty at stack depth one.
    fn get_caller(&self) -> Vec<u8>;

    /// The object under `key` in the current program's space; empty on
    /// absence.
    fn get_object(&mut self, space_id: u32, key: &[u8]) -> Vec<u8>;

    /// Write an object in the current program's space, metering disk
    /// storage.
    fn put_object(&mut self, space_id: u32, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Resolve authority for `account` (see the execution layer for the
    /// per-account-type rules).
    fn check_authority(&mut self, account: &[u8]) -> Result<bool, Error>;

    /// Remaining compute ticks available to the program.
    fn get_meter_ticks(&self) -> u64;

    /// Surrender `ticks` consumed compute ticks to the meter.
    fn use_meter_ticks(&mut self, ticks: u64) -> Result<(), Error>;
}
