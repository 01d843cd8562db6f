//! Rays

use super::{Point3f, Vector3f};

/// A ray leaving a light source. The id is fresh for every spawned photon so
/// downstream consumers can distinguish samples without comparing geometry.
#[derive(Copy, Clone, Debug)]
pub struct Ray {
    /// Origin.
    pub o: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Identifier, unique within one emission context.
    pub id: u64,
}

impl Ray {
    /// Returns a new ray.
    ///
    /// * `o`  - Origin.
    /// * `d`  - Direction.
    /// * `id` - Identifier.
    pub fn new(o: Point3f, d: Vector3f, id: u64) -> Self {
        Self { o, d, id }
    }
}
