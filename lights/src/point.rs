//! Point Light Source

use lumen_core::geometry::*;
use lumen_core::lumen::*;
use lumen_core::photon::*;
use lumen_core::spectrum::*;

/// An isotropic light that emits the same amount of light in all directions.
#[derive(Clone)]
pub struct PointLight {
    /// Emission colour.
    pub color: Spectrum,

    /// Brightness multiplier applied to the colour.
    pub intensity: Float,

    /// Rate at which brightness decays with distance; zero gives a constant
    /// brightness at every distance.
    pub decay_rate: Float,

    /// Physical radius, used for penumbra origin jitter.
    pub radius: Float,
}

impl PointLight {
    /// Returns a new `PointLight`.
    ///
    /// * `color`      - Emission colour.
    /// * `intensity`  - Brightness multiplier.
    /// * `decay_rate` - Distance decay rate.
    /// * `radius`     - Physical radius.
    pub fn new(color: Spectrum, intensity: Float, decay_rate: Float, radius: Float) -> Self {
        Self {
            color,
            intensity,
            decay_rate,
            radius,
        }
    }

    /// Brightness-scaled colour measured at the given distance.
    ///
    /// * `distance` - Distance from the light.
    pub fn light_at(&self, distance: Float) -> Spectrum {
        let d = distance * self.decay_rate;
        self.color * (self.intensity / (1.0 + d + d * d))
    }
}

/// Photon-emission strategy for a [`PointLight`]: uniform sampling of the
/// full sphere of directions, stratified over shrinking k×k grids in
/// (cosθ, φ) just like the spotlight source.
pub struct PointPhotonSource {
    light: PointLight,
    position: Point3f,
    color: Spectrum,
    intensity: Float,
}

impl PointPhotonSource {
    /// Create a `PointPhotonSource`. As with the spotlight, the intensity is
    /// measured at half the distance to the farthest corner of the scene
    /// bounds and scaled by the full-sphere solid angle.
    ///
    /// * `light`        - The light.
    /// * `position`     - The light's position.
    /// * `scene_bounds` - The scene's bounding box.
    pub fn new(light: PointLight, position: Point3f, scene_bounds: &Bounds3f) -> Self {
        let radius = effective_radius(scene_bounds, &position);
        let mut color = light.light_at(radius);
        let mut intensity = color.sum();
        if intensity == 0.0 {
            debug!("point light has zero intensity; photon emission will be skipped");
        } else {
            color = color * (1.0 / intensity);
            intensity *= FOUR_PI * radius * radius;
        }

        Self {
            light,
            position,
            color,
            intensity,
        }
    }
}

impl PhotonSource for PointPhotonSource {
    fn total_intensity(&self) -> Float {
        self.intensity
    }

    fn generate_photons(&self, ctx: &mut EmissionContext<'_>, intensity: Float) {
        let mut num = intensity as usize;

        // Stratify (cosθ, φ) over shrinking n×n grids; one jittered sample
        // per cell covers the sphere without clumping.
        while num > 0 {
            let mut n = (num as Float).sqrt() as usize;
            if n == 0 {
                n = 1;
            }
            let du = 2.0 / n as Float;
            let dv = TWO_PI / n as Float;
            let mut base_u = -1.0;
            for _ in 0..n {
                let mut base_v = 0.0;
                for _ in 0..n {
                    if ctx.is_cancelled() {
                        return;
                    }
                    let ctheta = base_u + ctx.random() * du;
                    let v = base_v + ctx.random() * dv;
                    let stheta = (1.0 - ctheta * ctheta).max(0.0).sqrt();
                    let (sphi, cphi) = v.sin_cos();
                    let dir = Vector3f::new(stheta * sphi, stheta * cphi, ctheta);
                    let mut orig = self.position;
                    if ctx.soft_shadows() {
                        ctx.randomize_point(&mut orig, self.light.radius);
                    }
                    let ray = Ray::new(orig, dir, ctx.next_ray_id());
                    ctx.spawn_photon(&ray, &self.color, false);
                    base_v += dv;
                }
                base_u += du;
            }
            num -= n * n;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
