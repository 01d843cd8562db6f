//! Photon emission

mod emission;
mod sink;

// Re-export.
pub use emission::*;
pub use sink::*;
