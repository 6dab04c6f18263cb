//! Error types for resolution, invocation and memory access

use uniresolve_engine::BridgeError;

/// Error type for guarded memory access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Base pointer was null
    #[error("Null pointer")]
    NullPointer,

    /// Field offset is negative (static or thread-static storage)
    #[error("Negative field offset: {0}")]
    NegativeOffset(i32),

    /// Address arithmetic overflowed
    #[error("Address overflow: {base:#x} + {offset}")]
    Overflow { base: usize, offset: usize },

    /// A managed length prefix is negative or implausibly large
    #[error("Invalid length {length} at {address:#x}")]
    InvalidLength { address: usize, length: i64 },

    /// The memory is not mapped or lacks the required protection
    #[error("Target no longer valid: {address:#x} ({len} bytes)")]
    InvalidTarget { address: usize, len: usize },
}

/// Error type for runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Export resolution failed
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Guarded memory access failed
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A runtime export returned null where a value is required
    #[error("{export} returned null")]
    NullResult { export: &'static str },

    /// The global runtime context has not been initialized
    #[error("Runtime not initialized")]
    NotReady,

    /// The global runtime context was already initialized
    #[error("Runtime already initialized")]
    AlreadyInitialized,

    /// The runtime's VM never reported ready within the retry bound
    #[error("Runtime VM not ready after {attempts} attempt(s)")]
    RuntimeNotReady { attempts: u32 },

    #[error("Assembly not found: {0}")]
    AssemblyNotFound(String),

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Field not found: {class}.{field}")]
    FieldNotFound { class: String, field: String },

    #[error("Method not found: {class}.{method}")]
    MethodNotFound { class: String, method: String },

    /// Methods with the name exist but none matches the requested parameters
    #[error("No overload of {class}.{method} matches ({params})")]
    NoExactOverload {
        class: String,
        method: String,
        params: String,
    },

    /// Static access requested on an instance field
    #[error("Field {0} is not static")]
    NotStatic(String),

    /// Instance access requested on a static field
    #[error("Field {0} is static")]
    IsStatic(String),

    /// No native entry point is available for the method
    #[error("Method {0} has no native entry point")]
    NotCompiled(String),

    /// The managed method threw
    #[error("{method} threw {exception}")]
    ManagedException { method: String, exception: String },

    /// A non-void method returned a null object
    #[error("{0} returned null")]
    NullReturn(String),

    /// Unboxing the returned object produced null
    #[error("Unboxing the result of {0} produced null")]
    NullUnbox(String),

    /// Instance method invoked without an instance
    #[error("Instance method {0} requires an instance")]
    MissingInstance(String),

    /// Reflective call given the wrong number of arguments
    #[error("{method} takes {expected} argument(s), got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// Direct call was refused
    #[error("Call to {method} at {address:#x} refused: {reason}")]
    CallFault {
        method: String,
        address: usize,
        reason: String,
    },

    /// Value kind does not match the field's type
    #[error("Type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// The field's type has no value representation
    #[error("Unsupported field type {type_name} for {field}")]
    UnsupportedKind { field: String, type_name: String },

    /// The runtime failed internally (caught panic or impossible state)
    #[error("Runtime operation failed: {0}")]
    Internal(String),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Whether the error came from a bad target address rather than a lookup
    pub fn is_invalid_target(&self) -> bool {
        matches!(
            self,
            Self::Access(AccessError::InvalidTarget { .. }) | Self::CallFault { .. }
        )
    }
}
