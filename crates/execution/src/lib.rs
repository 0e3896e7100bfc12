//! The execution layer of the Meridian engine.
//!
//! An [`ExecutionContext`] applies blocks and transactions against a state
//! node: it validates signatures and nonces, dispatches operations to
//! programs (native or WASM), meters resource consumption through payer
//! sessions, records call frames, and assembles receipts.

pub mod chronicler;
pub mod context;
pub mod program;
pub mod resource_meter;
pub mod stack;
pub mod state;

pub use chronicler::Chronicler;
pub use context::{ExecutionContext, Intent, StateNodeHandle, Tolerance};
pub use program::{FileDescriptor, Program, ProgramError, SystemInterface};
pub use resource_meter::{ResourceLimits, ResourceMeter, ResourceState, Session, SharedSession};
pub use stack::{Frame, FrameRecorder, ProgramStack, MAX_FRAME_DEPTH};
