//! Parallel execution engine.

mod cancel_token;
mod worker_pool;

// Re-export.
pub use cancel_token::*;
pub use worker_pool::*;
