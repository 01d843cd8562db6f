#[macro_use]
extern crate log;

use core::app::*;
use core::geometry::*;
use core::parallel::*;
use core::photon::*;
use core::spectrum::*;
use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};
use lights::*;
use std::sync::Arc;
use std::thread;

/// Streams every photon over a bounded channel so a single collector thread
/// owns the statistics; the senders may be called from any pool worker.
struct ChannelSink {
    tx: Sender<(Ray, Spectrum, bool)>,
}

impl PhotonSink for ChannelSink {
    fn spawn_photon(&self, ray: &Ray, color: &Spectrum, caustic: bool) {
        self.tx.send((*ray, *color, caustic)).unwrap();
    }
}

fn main() {
    // Initialize `env_logger`.
    env_logger::init();

    let mut pool = WorkerPool::with_threads(OPTIONS.threads());
    let token = CancelToken::new();

    // Demo scene: a 10-unit room lit by a spotlight in the ceiling and a
    // point light near a corner.
    let bounds = Bounds3f::new(Point3f::new(-5.0, -5.0, -5.0), Point3f::new(5.0, 5.0, 5.0));

    let spot = SpotLight::new(Spectrum::from_rgb(1.0, 0.95, 0.8), 1.0, 0.1, 30.0, 8.0, 0.2);
    let spot_frame = CoordinateSystem::new(Point3f::new(0.0, 4.9, 0.0), Vector3f::new(0.0, -1.0, 0.0));

    let point = PointLight::new(Spectrum::from_rgb(0.4, 0.5, 1.0), 0.5, 0.1, 0.1);
    let point_pos = Point3f::new(3.5, 3.5, -3.5);

    let sources: Vec<Arc<dyn PhotonSource>> = vec![
        Arc::new(SpotPhotonSource::new(spot, spot_frame, &bounds)),
        Arc::new(PointPhotonSource::new(point, point_pos, &bounds)),
    ];

    let (tx, rx) = crossbeam_channel::bounded::<(Ray, Spectrum, bool)>(8192);
    let sink = Arc::new(ChannelSink { tx });

    let progress = if OPTIONS.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar(OPTIONS.photons as u64)
    };

    // Spawn collector thread.
    let collector = thread::spawn(move || {
        let mut count = 0u64;
        let mut power = Spectrum::ZERO;
        for (_ray, color, _caustic) in rx.iter() {
            count += 1;
            power += color;
            progress.inc(1);
        }
        progress.finish_and_clear();
        (count, power)
    });

    emit_photons(
        &sources,
        OPTIONS.photons,
        sink,
        &mut pool,
        &token,
        OPTIONS.penumbra,
        OPTIONS.seed,
    );

    // Dispose of the workers; this also drops the pool's reference to the
    // sink so the channel closes and the collector drains out.
    pool.finish();

    match collector.join() {
        Ok((count, power)) => {
            info!(
                "emitted {} of {} photons; accumulated power ({:.3}, {:.3}, {:.3})",
                count, OPTIONS.photons, power.r, power.g, power.b
            );
        }
        Err(_) => error!("photon collector thread failed"),
    }
}

/// Returns a progress bar for tracking photons delivered to the map.
fn create_progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} photons {msg}")
            .unwrap()
            .progress_chars("▓▒░"),
    );
    bar
}
