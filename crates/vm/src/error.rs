use thiserror::Error;

/// Machine-level failures of the WASM adapter, kept distinct from program
/// exits so the execution context can tell them apart.
#[derive(Debug, Error)]
pub enum VmError {
    /// The module trapped (unreachable, bad memory access, …).
    #[error("trapped")]
    Trapped,
    /// A guest pointer fell outside the module's linear memory.
    #[error("invalid pointer")]
    InvalidPointer,
    /// The module is structurally unusable (e.g. exports no memory).
    #[error("invalid module")]
    InvalidModule,
    /// The bytecode failed to compile.
    #[error("load failure: {0}")]
    LoadFailure(String),
    /// The module failed to instantiate.
    #[error("instantiate failure: {0}")]
    InstantiateFailure(String),
    /// The `_start` entry point is missing or has the wrong signature.
    #[error("entry point not found")]
    EntryPointNotFound,
    /// The engine itself failed.
    #[error("execution environment failure: {0}")]
    ExecutionEnvironmentFailure(String),
    /// The program exited with a nonzero code via `proc_exit`.
    #[error("program exited with code {0}")]
    Exit(i32),
    /// A host call failed; carries the execution-layer error.
    #[error(transparent)]
    Host(meridian_types::Error),
}
