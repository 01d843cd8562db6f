//! Lights

#[macro_use]
extern crate log;

mod point;
mod spot;

// Re-export.
pub use point::*;
pub use spot::*;
