//! Photon sink

use crate::geometry::Ray;
use crate::spectrum::Spectrum;

/// Receives the photons generated by the emission engine, typically to store
/// them in a spatial photon map. The engine may deliver photons from several
/// worker threads at once; synchronizing the underlying storage is the
/// sink's responsibility.
pub trait PhotonSink: Send + Sync {
    /// Record one photon.
    ///
    /// * `ray`     - The photon's origin and direction.
    /// * `color`   - Normalized colour; one unit of intensity per photon.
    /// * `caustic` - Whether the photon belongs to the caustics map.
    fn spawn_photon(&self, ray: &Ray, color: &Spectrum, caustic: bool);
}
