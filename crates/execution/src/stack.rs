//! The program call stack and the post-mortem frame recorder.

use meridian_types::protocol::{Account, ProgramFrame};
use meridian_types::{Error, Reversion};
use std::sync::Arc;

/// Maximum nesting depth of program invocations.
pub const MAX_FRAME_DEPTH: usize = 32;

/// One live program invocation.
#[derive(Debug)]
pub struct Frame {
    /// The running program.
    pub program_id: Account,
    /// Argument strings.
    pub arguments: Vec<String>,
    /// Input bytes, read sequentially through `input_offset`.
    pub stdin: Vec<u8>,
    /// Cursor into `stdin`.
    pub input_offset: usize,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl Frame {
    pub fn new(program_id: Account, arguments: Vec<String>, stdin: Vec<u8>) -> Self {
        Self {
            program_id,
            arguments,
            stdin,
            input_offset: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Last-in-first-out stack of program frames.
#[derive(Debug, Default)]
pub struct ProgramStack {
    frames: Vec<Frame>,
}

impl ProgramStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an invocation frame. Fails once the configured depth would be
    /// exceeded.
    pub fn push_frame(&mut self, frame: Frame) -> Result<(), Error> {
        if self.frames.len() >= MAX_FRAME_DEPTH {
            return Err(Reversion::StackOverflow.into());
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top frame. Popping an empty stack is a programmer error.
    pub fn pop_frame(&mut self) -> Frame {
        match self.frames.pop() {
            Some(frame) => frame,
            None => panic!("stack is empty"),
        }
    }

    /// The top frame, mutable.
    pub fn peek_frame(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("stack is empty"),
        }
    }

    /// The top frame.
    pub fn current_frame(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => panic!("stack is empty"),
        }
    }

    /// The frame `levels` below the top, if any.
    pub fn frame_below_top(&self, levels: usize) -> Option<&Frame> {
        self.frames
            .len()
            .checked_sub(levels + 1)
            .and_then(|index| self.frames.get(index))
    }

    /// Current stack depth.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Records a copy of each completed frame so callers can reconstruct the
/// call tree post mortem.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    frames: Vec<Arc<ProgramFrame>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, frame: Arc<ProgramFrame>) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Arc<ProgramFrame>] {
        &self.frames
    }
}
