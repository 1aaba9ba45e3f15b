//! Error types for the call-boundary layer.

use thiserror::Error;

/// Result type for boundary operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can surface while resolving modules or boundary entries.
///
/// Variants carry `String` payloads so the type stays `Clone`; resolution
/// results are shared out of process-wide caches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The module open itself returned no usable handle.
    #[error("failed to resolve module `{module}`: {reason}")]
    ResolutionFailed { module: String, reason: String },

    /// The module opened fine, but the exported name is absent from its
    /// symbol table.
    #[error("symbol `{symbol}` not found in {module}")]
    SymbolNotFound { symbol: String, module: String },

    /// An entry with this name is already registered in the same direction.
    #[error("duplicate {direction} boundary entry `{symbol}`")]
    DuplicateEntry { direction: String, symbol: String },

    /// A name contained an embedded NUL and cannot cross the C boundary.
    #[error("invalid name `{0}`: embedded NUL")]
    InvalidName(String),
}
