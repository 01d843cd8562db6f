//! Spot Light Source

use lumen_core::geometry::*;
use lumen_core::lumen::*;
use lumen_core::photon::*;
use lumen_core::spectrum::*;

/// A cone-shaped light whose emission falls off as cosⁿ(θ) away from its
/// axis, down to zero outside the cone half angle.
#[derive(Clone)]
pub struct SpotLight {
    /// Emission colour.
    pub color: Spectrum,

    /// Brightness multiplier applied to the colour.
    pub intensity: Float,

    /// Rate at which brightness decays with distance; zero gives a constant
    /// brightness at every distance.
    pub decay_rate: Float,

    /// Angular falloff exponent n in cosⁿ(θ).
    pub exponent: Float,

    /// Physical radius, used for penumbra origin jitter.
    pub radius: Float,

    /// Cosine of the cone half angle.
    cos_half_angle: Float,
}

impl SpotLight {
    /// Returns a new `SpotLight`.
    ///
    /// * `color`      - Emission colour.
    /// * `intensity`  - Brightness multiplier.
    /// * `decay_rate` - Distance decay rate.
    /// * `half_angle` - Cone half angle in degrees.
    /// * `exponent`   - Angular falloff exponent.
    /// * `radius`     - Physical radius.
    pub fn new(
        color: Spectrum,
        intensity: Float,
        decay_rate: Float,
        half_angle: Float,
        exponent: Float,
        radius: Float,
    ) -> Self {
        Self {
            color,
            intensity,
            decay_rate,
            exponent,
            radius,
            cos_half_angle: half_angle.to_radians().cos(),
        }
    }

    /// Cosine of the cone half angle.
    pub fn angle_cos(&self) -> Float {
        self.cos_half_angle
    }

    /// Brightness-scaled colour measured at the given distance. The light is
    /// not an exact inverse-square emitter, so the measured colour depends on
    /// where it is measured.
    ///
    /// * `distance` - Distance from the light.
    pub fn light_at(&self, distance: Float) -> Spectrum {
        let d = distance * self.decay_rate;
        self.color * (self.intensity / (1.0 + d + d * d))
    }
}

/// Photon-emission strategy for a [`SpotLight`]: importance sampling matched
/// to the cosⁿ falloff, stratified over shrinking k×k grids to reduce
/// clumping at low sample counts.
pub struct SpotPhotonSource {
    light: SpotLight,
    frame: CoordinateSystem,
    color: Spectrum,
    intensity: Float,
    min_u: Float,
}

impl SpotPhotonSource {
    /// Create a `SpotPhotonSource`. The emission profile is derived once per
    /// scene: the falloff does not behave exactly as 1/r², so the intensity
    /// is measured at half the distance to the farthest corner of the scene
    /// bounds and scaled by the solid-angle integral of the cone.
    ///
    /// * `light`        - The light.
    /// * `frame`        - The light's placement; z is the emission axis.
    /// * `scene_bounds` - The scene's bounding box.
    pub fn new(light: SpotLight, frame: CoordinateSystem, scene_bounds: &Bounds3f) -> Self {
        let exp = light.exponent + 1.0;
        if exp == 0.0 {
            debug!("spot light falloff exponent of -1 is degenerate; photon emission will be skipped");
            return Self {
                light,
                frame,
                color: Spectrum::ZERO,
                intensity: 0.0,
                min_u: 0.0,
            };
        }
        let min_u = light.angle_cos().powf(exp) / exp;

        let radius = effective_radius(scene_bounds, &frame.origin);
        let mut color = light.light_at(radius);
        let mut intensity = color.sum();
        if intensity == 0.0 {
            debug!("spot light has zero intensity; photon emission will be skipped");
        } else {
            color = color * (1.0 / intensity);
            intensity *= (1.0 / exp - min_u) * TWO_PI * radius * radius;
        }

        Self {
            light,
            frame,
            color,
            intensity,
            min_u,
        }
    }

    /// The normalized colour carried by every photon from this source.
    pub fn color(&self) -> Spectrum {
        self.color
    }
}

/// Map an importance sample u back to the cosine of the emission angle for a
/// cosⁿ falloff with marginal exponent `exp` = n + 1.
fn falloff_cos_theta(u: Float, exp: Float) -> Float {
    (u * exp).powf(1.0 / exp)
}

impl PhotonSource for SpotPhotonSource {
    fn total_intensity(&self) -> Float {
        self.intensity
    }

    fn generate_photons(&self, ctx: &mut EmissionContext<'_>, intensity: Float) {
        let exp = self.light.exponent + 1.0;
        let max_u = 1.0 / exp;
        let u_size = max_u - self.min_u;
        let pos = self.frame.origin;
        let mut num = intensity as usize;

        // Send out the photons. To reduce noise we use stratified sampling:
        // repeatedly find the largest n×n grid whose number of cells is no
        // larger than the number of photons still needed, and send out one
        // photon through a random point in each cell.
        while num > 0 {
            let mut n = (num as Float).sqrt() as usize;
            if n == 0 {
                n = 1;
            }
            let du = u_size / n as Float;
            let dv = TWO_PI / n as Float;
            let mut base_u = self.min_u;
            for _ in 0..n {
                let mut base_v = 0.0;
                for _ in 0..n {
                    if ctx.is_cancelled() {
                        return;
                    }
                    let u = base_u + ctx.random() * du;
                    let v = base_v + ctx.random() * dv;
                    let ctheta = falloff_cos_theta(u, exp);
                    let stheta = (1.0 - ctheta * ctheta).max(0.0).sqrt();
                    let (sphi, cphi) = v.sin_cos();
                    let dir = self
                        .frame
                        .to_world(&Vector3f::new(stheta * sphi, stheta * cphi, ctheta));
                    let mut orig = pos;
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

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::parallel::CancelToken;
    use lumen_core::rng::RNG;
    use float_cmp::approx_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn unit_cube() -> Bounds3f {
        Bounds3f::new(Point3f::new(-0.5, -0.5, -0.5), Point3f::new(0.5, 0.5, 0.5))
    }

    fn test_source(half_angle: Float, exponent: Float) -> SpotPhotonSource {
        let light = SpotLight::new(
            Spectrum::from_rgb(1.0, 0.8, 0.6),
            1.0,
            0.0,
            half_angle,
            exponent,
            0.0,
        );
        // Shining down the -z axis from 10 units above the scene.
        let frame =
            CoordinateSystem::new(Point3f::new(0.0, 0.0, 10.0), Vector3f::new(0.0, 0.0, -1.0));
        SpotPhotonSource::new(light, frame, &unit_cube())
    }

    struct CollectingSink {
        directions: Mutex<Vec<Vector3f>>,
    }

    impl PhotonSink for CollectingSink {
        fn spawn_photon(&self, ray: &Ray, _color: &Spectrum, _caustic: bool) {
            self.directions.lock().unwrap().push(ray.d);
        }
    }

    struct CountingSink {
        count: AtomicUsize,
    }

    impl PhotonSink for CountingSink {
        fn spawn_photon(&self, _ray: &Ray, _color: &Spectrum, _caustic: bool) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Cancels its token once a set number of photons has been delivered.
    struct CancellingSink {
        count: AtomicUsize,
        threshold: usize,
        token: CancelToken,
    }

    impl PhotonSink for CancellingSink {
        fn spawn_photon(&self, _ray: &Ray, _color: &Spectrum, _caustic: bool) {
            if self.count.fetch_add(1, Ordering::SeqCst) + 1 == self.threshold {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn total_intensity_is_finite_and_positive() {
        let source = test_source(30.0, 8.0);
        let intensity = source.total_intensity();
        assert!(intensity.is_finite());
        assert!(intensity > 0.0);
    }

    #[test]
    fn zero_colour_gives_zero_intensity() {
        let light = SpotLight::new(Spectrum::ZERO, 1.0, 0.0, 30.0, 8.0, 0.0);
        let frame =
            CoordinateSystem::new(Point3f::new(0.0, 0.0, 10.0), Vector3f::new(0.0, 0.0, -1.0));
        let source = SpotPhotonSource::new(light, frame, &unit_cube());
        assert_eq!(source.total_intensity(), 0.0);

        // A zero budget emits nothing rather than dividing by zero.
        let sink = CountingSink {
            count: AtomicUsize::new(0),
        };
        let token = CancelToken::new();
        let mut ctx = EmissionContext::new(&sink, &token, RNG::new(1), false);
        source.generate_photons(&mut ctx, 0.0);
        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn emits_exactly_the_requested_count_inside_the_cone() {
        let source = test_source(30.0, 8.0);
        let sink = CollectingSink {
            directions: Mutex::new(Vec::new()),
        };
        let token = CancelToken::new();
        let mut ctx = EmissionContext::new(&sink, &token, RNG::new(42), false);
        source.generate_photons(&mut ctx, 500.0);

        let axis = Vector3f::new(0.0, 0.0, -1.0);
        let cos_half = (30.0f64).to_radians().cos();
        let directions = sink.directions.lock().unwrap();
        assert_eq!(directions.len(), 500);
        for d in directions.iter() {
            assert!(approx_eq!(f64, d.length(), 1.0, epsilon = 1e-9));
            assert!(d.dot(&axis) >= cos_half - 1e-9);
        }
    }

    #[test]
    fn emitted_colour_is_normalized() {
        let source = test_source(30.0, 8.0);
        assert!(approx_eq!(f64, source.color().sum(), 1.0, epsilon = 1e-12));
    }

    #[test]
    fn cancellation_stops_emission_between_cells() {
        let source = test_source(30.0, 8.0);
        let token = CancelToken::new();
        let sink = CancellingSink {
            count: AtomicUsize::new(0),
            threshold: 100,
            token: token.clone(),
        };
        let mut ctx = EmissionContext::new(&sink, &token, RNG::new(7), false);
        source.generate_photons(&mut ctx, 500.0);

        // The token is checked before every cell, so emission halts right
        // after the hundredth photon.
        assert_eq!(sink.count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn soft_shadows_jitter_origin_within_light_radius() {
        let light = SpotLight::new(Spectrum::new(1.0), 1.0, 0.0, 30.0, 8.0, 0.25);
        let origin = Point3f::new(0.0, 0.0, 10.0);
        let frame = CoordinateSystem::new(origin, Vector3f::new(0.0, 0.0, -1.0));
        let source = SpotPhotonSource::new(light, frame, &unit_cube());

        struct OriginSink {
            origin: Point3f,
            max_radius2: Float,
        }
        impl PhotonSink for OriginSink {
            fn spawn_photon(&self, ray: &Ray, _color: &Spectrum, _caustic: bool) {
                assert!(ray.o.distance_squared(&self.origin) <= self.max_radius2 + 1e-12);
            }
        }

        let sink = OriginSink {
            origin,
            max_radius2: 0.25 * 0.25,
        };
        let token = CancelToken::new();
        let mut ctx = EmissionContext::new(&sink, &token, RNG::new(3), true);
        source.generate_photons(&mut ctx, 64.0);
    }

    #[test]
    fn degenerate_exponent_skips_emission() {
        let light = SpotLight::new(Spectrum::new(1.0), 1.0, 0.0, 30.0, -1.0, 0.0);
        let frame =
            CoordinateSystem::new(Point3f::new(0.0, 0.0, 10.0), Vector3f::new(0.0, 0.0, -1.0));
        let source = SpotPhotonSource::new(light, frame, &unit_cube());
        assert_eq!(source.total_intensity(), 0.0);
    }

    #[test]
    fn pool_driven_emission_covers_the_whole_budget() {
        use lumen_core::parallel::WorkerPool;
        use std::sync::Arc;

        let ceiling = test_source(30.0, 8.0);
        let corner = {
            let light = SpotLight::new(Spectrum::from_rgb(0.2, 0.4, 0.9), 0.5, 0.0, 45.0, 2.0, 0.0);
            let frame =
                CoordinateSystem::new(Point3f::new(4.0, 4.0, 4.0), Vector3f::new(-1.0, -1.0, -1.0));
            SpotPhotonSource::new(light, frame, &unit_cube())
        };
        let sources: Vec<Arc<dyn PhotonSource>> = vec![Arc::new(ceiling), Arc::new(corner)];

        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::with_threads(2);
        let token = CancelToken::new();
        emit_photons(&sources, 1000, sink.clone(), &mut pool, &token, false, 42);
        pool.finish();

        // Each light emits the floor of its share, so at most one photon per
        // light is dropped to rounding.
        let count = sink.count.load(Ordering::SeqCst);
        assert!(count >= 998 && count <= 1000);
    }

    proptest! {
        #[test]
        fn stratified_count_is_exact(num in 0usize..3000) {
            let source = test_source(45.0, 2.0);
            let sink = CountingSink { count: AtomicUsize::new(0) };
            let token = CancelToken::new();
            let mut ctx = EmissionContext::new(&sink, &token, RNG::new(num as u64), false);
            source.generate_photons(&mut ctx, num as Float + 0.4);
            prop_assert_eq!(sink.count.load(Ordering::SeqCst), num);
        }

        #[test]
        fn sampled_cosine_stays_in_the_cone(
            exponent in 0.0..128.0f64,
            half_angle in 1.0..89.0f64,
            r in 0.0..1.0f64,
        ) {
            let exp = exponent + 1.0;
            let cos_half = half_angle.to_radians().cos();
            let min_u = cos_half.powf(exp) / exp;
            let max_u = 1.0 / exp;
            let u = min_u + r * (max_u - min_u);
            let ctheta = falloff_cos_theta(u, exp);
            prop_assert!(ctheta >= cos_half - 1e-9);
            prop_assert!(ctheta <= 1.0 + 1e-9);
        }
    }
}
