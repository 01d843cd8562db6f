//! Photon emission task and budget apportioning.

use super::PhotonSink;
use crate::geometry::{Bounds3f, Point3f, Ray, Vector3f};
use crate::lumen::Float;
use crate::parallel::{CancelToken, IndexedTask, WorkerPool};
use crate::rng::RNG;
use crate::spectrum::Spectrum;
use std::sync::Arc;

/// A light source viewed through its photon-emission strategy. One
/// implementation exists per light type; the engine only needs to know how
/// bright a light is and how to turn an intensity budget into photons.
pub trait PhotonSource: Send + Sync {
    /// Estimate of the total intensity this light sends into the scene, used
    /// to apportion the global photon budget. An approximation, not an exact
    /// physical power.
    fn total_intensity(&self) -> Float;

    /// Generate photons whose aggregate intensity approximates `intensity`
    /// (one unit per photon) and hand them to the context's sink.
    ///
    /// * `ctx`       - The per-invocation emission context.
    /// * `intensity` - The intensity budget; `floor(intensity)` photons.
    fn generate_photons(&self, ctx: &mut EmissionContext<'_>, intensity: Float);
}

/// Everything one light's emission loop needs: the sink, the cancellation
/// token, a private random number generator and a fresh-id counter. One
/// context exists per light per run, so the generator is never shared
/// between threads.
pub struct EmissionContext<'a> {
    sink: &'a dyn PhotonSink,
    token: &'a CancelToken,
    rng: RNG,
    soft_shadows: bool,
    next_id: u64,
    spawned: u64,
}

impl<'a> EmissionContext<'a> {
    /// Create a context for one light's emission run.
    ///
    /// * `sink`         - Where generated photons go.
    /// * `token`        - Checked once per stratified cell.
    /// * `rng`          - Sample source owned by this invocation.
    /// * `soft_shadows` - Jitter photon origins within the light's radius.
    pub fn new(
        sink: &'a dyn PhotonSink,
        token: &'a CancelToken,
        rng: RNG,
        soft_shadows: bool,
    ) -> Self {
        Self {
            sink,
            token,
            rng,
            soft_shadows,
            next_id: 0,
            spawned: 0,
        }
    }

    /// Returns true once the render this emission belongs to was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a uniform sample in [0, 1).
    pub fn random(&mut self) -> Float {
        self.rng.uniform_float()
    }

    /// Whether photon origins should be jittered for penumbra sampling.
    pub fn soft_shadows(&self) -> bool {
        self.soft_shadows
    }

    /// Returns an identifier not yet carried by any ray from this context.
    pub fn next_ray_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Offset the point by a uniform random offset inside a sphere of the
    /// given radius, by rejection sampling the enclosing cube.
    ///
    /// * `p`      - The point to perturb.
    /// * `radius` - The sphere radius.
    pub fn randomize_point(&mut self, p: &mut Point3f, radius: Float) {
        if radius == 0.0 {
            return;
        }
        loop {
            let x = 1.0 - 2.0 * self.rng.uniform_float();
            let y = 1.0 - 2.0 * self.rng.uniform_float();
            let z = 1.0 - 2.0 * self.rng.uniform_float();
            if x * x + y * y + z * z > 1.0 {
                continue;
            }
            *p += Vector3f::new(x, y, z) * radius;
            return;
        }
    }

    /// Hand one photon to the sink.
    ///
    /// * `ray`     - The photon's origin and direction.
    /// * `color`   - Normalized colour.
    /// * `caustic` - Whether the photon belongs to the caustics map.
    pub fn spawn_photon(&mut self, ray: &Ray, color: &Spectrum, caustic: bool) {
        self.spawned += 1;
        self.sink.spawn_photon(ray, color, caustic);
    }

    /// Number of photons handed to the sink so far.
    pub fn photons_spawned(&self) -> u64 {
        self.spawned
    }
}

/// Half the distance from `pos` to the farthest corner of the scene bounds.
/// Lights whose brightness does not fall off exactly as 1/r² evaluate their
/// intensity at this representative distance; the result is a documented
/// approximation, not an exact physical quantity.
///
/// * `bounds` - The scene's bounding box.
/// * `pos`    - The light's position.
pub fn effective_radius(bounds: &Bounds3f, pos: &Point3f) -> Float {
    let mut max_dist2: Float = 0.0;
    for corner in bounds.corners() {
        let dist2 = pos.distance_squared(&corner);
        if dist2 > max_dist2 {
            max_dist2 = dist2;
        }
    }
    max_dist2.sqrt() * 0.5
}

/// The pool task that drives photon emission: the index is the light number.
/// Each execution builds a deterministic per-light context, so photon
/// sequences do not depend on which worker picks the light up.
pub struct PhotonEmissionTask {
    sources: Vec<Arc<dyn PhotonSource>>,
    budgets: Vec<Float>,
    sink: Arc<dyn PhotonSink>,
    token: CancelToken,
    soft_shadows: bool,
    seed: u64,
}

impl PhotonEmissionTask {
    /// Create the emission task.
    ///
    /// * `sources`      - The lights to emit from.
    /// * `budgets`      - Intensity budget per light; same length as `sources`.
    /// * `sink`         - Where generated photons go.
    /// * `token`        - Cancels emission mid-light.
    /// * `soft_shadows` - Jitter photon origins for penumbra sampling.
    /// * `seed`         - Base seed for the per-light sample sequences.
    pub fn new(
        sources: Vec<Arc<dyn PhotonSource>>,
        budgets: Vec<Float>,
        sink: Arc<dyn PhotonSink>,
        token: CancelToken,
        soft_shadows: bool,
        seed: u64,
    ) -> Self {
        assert_eq!(sources.len(), budgets.len());
        Self {
            sources,
            budgets,
            sink,
            token,
            soft_shadows,
            seed,
        }
    }
}

impl IndexedTask for PhotonEmissionTask {
    fn execute(&self, index: usize) {
        if self.token.is_cancelled() {
            return;
        }
        let rng = RNG::new(self.seed.wrapping_add(index as u64));
        let mut ctx = EmissionContext::new(self.sink.as_ref(), &self.token, rng, self.soft_shadows);
        self.sources[index].generate_photons(&mut ctx, self.budgets[index]);
        debug!(
            "light {} emitted {} photons of budget {:.1}",
            index,
            ctx.photons_spawned(),
            self.budgets[index]
        );
    }
}

/// Emit a scene's photons: apportion `total_photons` among the sources in
/// proportion to their total intensity, then run one emission per light on
/// the pool. Returns once every light has been processed or the run was
/// cancelled.
///
/// * `sources`       - The scene's photon sources.
/// * `total_photons` - The global photon budget.
/// * `sink`          - Where generated photons go.
/// * `pool`          - The worker pool to run on.
/// * `token`         - Cancels emission mid-run.
/// * `soft_shadows`  - Jitter photon origins for penumbra sampling.
/// * `seed`          - Base seed for the per-light sample sequences.
pub fn emit_photons(
    sources: &[Arc<dyn PhotonSource>],
    total_photons: usize,
    sink: Arc<dyn PhotonSink>,
    pool: &mut WorkerPool,
    token: &CancelToken,
    soft_shadows: bool,
    seed: u64,
) {
    let intensities: Vec<Float> = sources.iter().map(|s| s.total_intensity()).collect();
    let total: Float = intensities.iter().sum();
    if !(total > 0.0) {
        debug!("no light intensity in the scene; skipping photon emission");
        return;
    }

    let scale = total_photons as Float / total;
    let budgets: Vec<Float> = intensities.iter().map(|i| i * scale).collect();

    pool.configure(sources.len());
    pool.set_task(Arc::new(PhotonEmissionTask::new(
        sources.to_vec(),
        budgets,
        sink,
        token.clone(),
        soft_shadows,
        seed,
    )));
    pool.run();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingSink {
        count: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
            })
        }
    }

    impl PhotonSink for CountingSink {
        fn spawn_photon(&self, _ray: &Ray, _color: &Spectrum, _caustic: bool) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Emits `floor(budget)` photons straight up and records the budget it
    /// was handed.
    struct FakeSource {
        intensity: Float,
        received: Mutex<Float>,
    }

    impl FakeSource {
        fn new(intensity: Float) -> Arc<Self> {
            Arc::new(Self {
                intensity,
                received: Mutex::new(0.0),
            })
        }
    }

    impl PhotonSource for FakeSource {
        fn total_intensity(&self) -> Float {
            self.intensity
        }

        fn generate_photons(&self, ctx: &mut EmissionContext<'_>, intensity: Float) {
            *self.received.lock().unwrap() = intensity;
            for _ in 0..intensity as usize {
                if ctx.is_cancelled() {
                    return;
                }
                let ray = Ray::new(
                    Point3f::new(0.0, 0.0, 0.0),
                    Vector3f::new(0.0, 0.0, 1.0),
                    ctx.next_ray_id(),
                );
                ctx.spawn_photon(&ray, &Spectrum::new(1.0 / 3.0), false);
            }
        }
    }

    #[test]
    fn budget_is_apportioned_by_intensity() {
        let dim = FakeSource::new(1.0);
        let bright = FakeSource::new(3.0);
        let sources: Vec<Arc<dyn PhotonSource>> = vec![dim.clone(), bright.clone()];
        let sink = CountingSink::new();
        let mut pool = WorkerPool::with_threads(2);
        let token = CancelToken::new();

        emit_photons(&sources, 400, sink.clone(), &mut pool, &token, false, 0);
        pool.finish();

        assert!(approx_eq!(f64, *dim.received.lock().unwrap(), 100.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, *bright.received.lock().unwrap(), 300.0, epsilon = 1e-9));
        assert_eq!(sink.count.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn zero_total_intensity_skips_emission() {
        let sources: Vec<Arc<dyn PhotonSource>> = vec![FakeSource::new(0.0), FakeSource::new(0.0)];
        let sink = CountingSink::new();
        let mut pool = WorkerPool::with_threads(2);
        let token = CancelToken::new();

        emit_photons(&sources, 400, sink.clone(), &mut pool, &token, false, 0);
        pool.finish();

        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_token_emits_nothing() {
        let sources: Vec<Arc<dyn PhotonSource>> = vec![FakeSource::new(2.0)];
        let sink = CountingSink::new();
        let mut pool = WorkerPool::with_threads(1);
        let token = CancelToken::new();
        token.cancel();

        emit_photons(&sources, 100, sink.clone(), &mut pool, &token, false, 0);
        pool.finish();

        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn randomize_point_stays_within_radius() {
        let sink = CountingSink::new();
        let token = CancelToken::new();
        let mut ctx = EmissionContext::new(sink.as_ref(), &token, RNG::new(11), true);
        let origin = Point3f::new(1.0, 2.0, 3.0);
        for _ in 0..1000 {
            let mut p = origin;
            ctx.randomize_point(&mut p, 2.0);
            assert!(p.distance_squared(&origin) <= 4.0 + 1e-9);
        }
    }

    #[test]
    fn effective_radius_uses_farthest_corner() {
        let bounds = Bounds3f::new(Point3f::new(-0.5, -0.5, -0.5), Point3f::new(0.5, 0.5, 0.5));
        let pos = Point3f::new(10.0, 0.0, 0.0);
        let expected = (10.5f64 * 10.5 + 0.25 + 0.25).sqrt() * 0.5;
        assert!(approx_eq!(f64, effective_radius(&bounds, &pos), expected, epsilon = 1e-12));
    }

    #[test]
    fn ray_ids_are_fresh_per_context() {
        let sink = CountingSink::new();
        let token = CancelToken::new();
        let mut ctx = EmissionContext::new(sink.as_ref(), &token, RNG::new(0), false);
        let ids: Vec<u64> = (0..100).map(|_| ctx.next_ray_id()).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        assert_eq!(ids.len(), 100);
    }
}
