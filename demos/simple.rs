use image::{GrayImage, Luma};
use limbus_gaze::utils::sampling::project_circle_3d;
use limbus_gaze::{
    fit_ellipse, Device, EyeObservation, GazeTracker, GradientField, RansacConfig, TrackerConfig,
};
use nalgebra as na;
use rand::prelude::*;

const ROI_SIZE: u32 = 100;

/// Renders a dark limbus on a bright background and picks its rim as edge candidates, plus a
/// few stray points.
fn observe(
    device: &Device,
    center: na::Point3<f64>,
    target: na::Point2<f64>,
    rng: &mut StdRng,
) -> Result<EyeObservation, limbus_gaze::Error> {
    let normal = na::Unit::new_normalize(na::Point3::new(target.x, target.y, 0.0) - center);
    let rim = project_circle_3d(&device.intrinsics, &center, &normal, 5.6, 64);

    let projected = device.intrinsics.project(&center).unwrap_or(na::Point2::origin());
    let half = ROI_SIZE as f64 / 2.0;
    let roi_origin = (projected - na::Point2::new(half, half)).map(f64::floor);

    let mut points: Vec<_> = rim.iter().map(|p| p - roi_origin).collect();
    let limbus = fit_ellipse(&points)?;

    let image = GrayImage::from_fn(ROI_SIZE, ROI_SIZE, |x, y| {
        let p = na::Point2::new(x as f64 + 0.5, y as f64 + 0.5);
        if limbus.algebraic_distance(&p) > 0.0 {
            Luma([230])
        } else {
            Luma([50])
        }
    });

    for _ in 0..8 {
        points.push(na::Point2::new(
            rng.gen_range(0.0..ROI_SIZE as f64),
            rng.gen_range(0.0..ROI_SIZE as f64),
        ));
    }

    Ok(EyeObservation {
        points,
        gradients: GradientField::from_intensity(&image)?,
        roi_origin,
    })
}

fn main() -> Result<(), limbus_gaze::Error> {
    tracing_subscriber::fmt::init();

    let device = Device::nexus7();
    let config = TrackerConfig {
        ransac: RansacConfig {
            seed: Some(7),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut tracker = GazeTracker::new(config, device);
    let mut rng = StdRng::seed_from_u64(3);

    // Fixate one target, then jump to another
    let targets = [na::Point2::new(20.0, -60.0), na::Point2::new(-25.0, -120.0)];
    for target in targets {
        for _ in 0..10 {
            let left = observe(&device, na::Point3::new(-31.0, -15.0, 280.0), target, &mut rng)?;
            let right = observe(&device, na::Point3::new(31.0, -15.0, 280.0), target, &mut rng)?;

            let frame = tracker.process_frame([Some(&left), Some(&right)]);
            for (eye, result) in frame.eyes.iter().enumerate() {
                match result {
                    Ok(track) => println!(
                        "eye {eye}: {}, rim reprojection {:.2} px",
                        track.limbus, track.reprojection_px
                    ),
                    Err(e) => println!("eye {eye}: {e}"),
                }
            }
            println!(
                "target ({:.1}, {:.1}) mm -> gaze ({:.1}, {:.1}) mm, ({:.0}, {:.0}) px",
                target.x, target.y, frame.gaze_mm.x, frame.gaze_mm.y, frame.gaze_px.x, frame.gaze_px.y
            );
        }
    }

    Ok(())
}
