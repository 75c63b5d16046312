//! # Error Kinds
//!
//! Typed error classification for the storage and query layers. All fallible
//! operations in this crate return `eyre::Result`; the variants below are
//! constructed at the failure site and carried inside the `eyre::Report`, so
//! callers that need to branch on the failure class can use
//! `report.downcast_ref::<CoreError>()` while everyone else gets a readable
//! message with full context.
//!
//! ## Classification
//!
//! | Variant | Source |
//! |---------|--------|
//! | `InvalidDatabase` | bad mnemonic, bad version, truncated file, footer magic mismatch, sync-mode conflict, unsupported encryption key |
//! | `Allocation` | slab growth failure, or any allocating call after free-space tracking was poisoned |
//! | `InvalidRef` | translating a ref outside every mapped region |
//! | `InvalidPredicate` | lexer or parser failure, with the original text and location |
//! | `Type` | comparison between incompatible types, aggregation or post-op on an unsupported type |
//! | `UnknownProperty` | identifier not resolvable against the base or current table |
//! | `Argument` | `$N` index out of range or an accessor of the wrong type |
//!
//! Nothing in the core retries; every error propagates to the caller.
//! Allocation errors additionally poison the allocator's free-space state
//! until `reset_free_space_tracking` is called.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("invalid ref {0:#x}: not inside the mapped file or any slab")]
    InvalidRef(u64),

    #[error("Invalid predicate: '{query}': {line}:{column}: {message}")]
    InvalidPredicate {
        query: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    UnknownProperty(String),

    #[error("invalid argument: {0}")]
    Argument(String),
}
