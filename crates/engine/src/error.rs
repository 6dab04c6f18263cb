//! Error types for runtime module location and symbol resolution

/// Error type for native bridge operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The runtime module does not export the requested symbol
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Symbol name cannot be converted to a C string (interior nul)
    #[error("Invalid symbol name: {0:?}")]
    InvalidSymbolName(String),

    /// No candidate runtime module was loaded within the retry bound
    #[error("Runtime module not found after {attempts} attempt(s) (tried: {tried})")]
    ModuleNotFound { attempts: u32, tried: String },

    /// The OS refused to hand out a handle to a loaded module
    #[error("Failed to open module {module}: {reason}")]
    ModuleOpen { module: String, reason: String },

    /// A null module handle was supplied by the host
    #[error("Null module handle")]
    NullModule,
}
