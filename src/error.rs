//! Errors that abort a generation run.
//!
//! Evaluation UB is deliberately *not* represented here: it is an expected,
//! recoverable condition handled by the rebuilder. Everything below terminates
//! the run with a non-zero status and no partial output.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    /// The caller built an ill-formed node (populator bug).
    #[error("ill-formed IR: {0}")]
    Precondition(String),

    /// A node still reported UB after the repair loop ran out of rounds.
    #[error("rebuild failed to clear UB in a {context} node after {rounds} rounds")]
    RebuildDivergence { context: &'static str, rounds: u32 },

    /// An iterator reached an arithmetic context without a pinned value.
    #[error("iterator `{0}` has no pinned value in the evaluation context")]
    UnpinnedIterator(String),

    /// A repair rule was asked to fix a node it has no rewrite for.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("bad option: {0}")]
    BadOption(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
