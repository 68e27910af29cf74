// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Hard failures of the draping pipeline.
//
// Rejected polygons, dangling planes and exhausted iteration budgets are not
// errors: they are logged and counted in DrapeStats.  Only conditions that
// leave the graph unusable surface here.

use thiserror::Error;

/// Errors raised while building or processing an arrangement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrapeError {
    /// An arena could not grow.
    #[error("out of memory while growing {what}")]
    OutOfMemory { what: &'static str },

    /// Every scratch mask bit is held by an enclosing pass.
    #[error("scratch mask pool exhausted")]
    MaskPoolExhausted,
}

/// Result type for draping operations
pub type Result<T> = std::result::Result<T, DrapeError>;
