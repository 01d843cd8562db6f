//! Core

#[macro_use]
extern crate hexf;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

// Re-export.
pub mod app;
pub mod geometry;
pub mod lumen;
pub mod parallel;
pub mod photon;
pub mod rng;
pub mod spectrum;
