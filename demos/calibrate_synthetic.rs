//! Synthetic Plumb Bob Calibration
//!
//! Loads a plumb bob camera from YAML, observes a 3D point grid through it from
//! a known pose, and recovers pose and intrinsics from the correspondences
//! alone. The recovered parameters, reprojection error and observability
//! diagnostics are printed. Pixels are then traced back onto a plane, and the
//! image centroid of a circular fiducial is estimated.
//!
//! Usage:
//! ```bash
//! cargo run --example calibrate_synthetic -- \
//!   --input-path samples/plumb_bob.yaml \
//!   --solver-config samples/solver_options.yaml \
//!   --report output/report.json
//! ```

use clap::Parser;
use log::info;
use nalgebra::{Vector2, Vector3};
use plumbbob_tools::camera::{CameraModel, PlumbBobModel};
use plumbbob_tools::geometry::{
    estimate_projected_area_and_centroid, grid_points_3d, sample_pixel_grid, AxisRange, Circle3,
    Plane3, Pose, Ray3,
};
use plumbbob_tools::optimization::{
    compute_reprojection_error, estimate_camera_parameters, SolverOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Plumb bob calibration from synthetic correspondences
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the ground truth camera YAML file
    #[arg(short = 'p', long, default_value = "samples/plumb_bob.yaml")]
    input_path: PathBuf,

    /// Optional solver settings YAML file
    #[arg(short = 's', long)]
    solver_config: Option<PathBuf>,

    /// Write the calibration report as JSON to this path
    #[arg(short = 'r', long)]
    report: Option<PathBuf>,

    /// Roll, pitch and yaw of the camera-from-world rotation in radians
    #[arg(long, num_args = 3, default_values_t = [0.05, -0.1, 0.02])]
    rotation: Vec<f64>,

    /// Camera-from-world translation in meters
    #[arg(long, num_args = 3, default_values_t = [0.1, -0.05, 0.5])]
    translation: Vec<f64>,
}

fn path_str(path: &Path) -> Result<&str, Box<dyn std::error::Error>> {
    Ok(path.to_str().ok_or("Invalid path string")?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let truth = PlumbBobModel::load_from_yaml(path_str(&cli.input_path)?)?;
    let options = match &cli.solver_config {
        Some(path) => SolverOptions::load_from_yaml(path_str(path)?)?,
        None => SolverOptions::default(),
    };
    let pose = Pose::from_euler_angles(
        cli.rotation[0],
        cli.rotation[1],
        cli.rotation[2],
        Vector3::new(cli.translation[0], cli.translation[1], cli.translation[2]),
    );

    println!("🎯 SYNTHETIC PLUMB BOB CALIBRATION");
    println!("==================================");
    println!("Ground truth camera: {}", truth);
    println!("Ground truth pose: {:?}", pose.to_flat());

    // Keep only grid points that land inside the image.
    let resolution = truth.get_resolution();
    let mut points3d = Vec::new();
    let mut points2d = Vec::new();
    for point in grid_points_3d(
        AxisRange::new(-1.0, 1.0, 0.1),
        AxisRange::new(-1.0, 1.0, 0.1),
        AxisRange::new(1.0, 4.0, 0.75),
    ) {
        if let Ok(pixel) = truth.project(&pose.transform_point(&point)) {
            if pixel.x >= 0.0
                && pixel.y >= 0.0
                && pixel.x < resolution.width as f64
                && pixel.y < resolution.height as f64
            {
                points3d.push(point);
                points2d.push(pixel);
            }
        }
    }
    println!("\n🎲 Correspondences inside the image: {}", points3d.len());
    info!("Generated {} correspondences", points3d.len());

    let mut template = PlumbBobModel::default();
    template.set_dependent_parameters(resolution.clone(), truth.get_intrinsics());
    template.allow_sixth_order_radial(truth.allows_sixth_order_radial());
    template.allow_skew(truth.allows_skew());

    let start_time = Instant::now();
    let result = estimate_camera_parameters(&template, &points3d, &points2d, &options)?;
    let elapsed = start_time.elapsed();

    println!("\n📊 Estimation Results ({:.2?}):", elapsed);
    println!("Converged: {} after {} rounds", result.converged, result.rounds);
    println!("Estimated camera: {}", result.model);
    println!("Estimated pose: {:?}", result.pose.to_flat());
    println!("Final cost: {:.6e}", result.final_cost);

    let error = compute_reprojection_error(&result.model, Some(&result.pose), &points3d, &points2d)?;
    println!("{:?}", error);

    println!("\n🔬 Observability:");
    println!("Condition number: {:.3e}", result.statistics.condition_number());
    for (i, eigenvalue) in result.statistics.eigenvalues().iter().enumerate() {
        println!("  λ{:<2} = {:.6e}", i, eigenvalue);
    }

    // Trace a few pixels back onto the world plane z = 2.
    println!("\n🔁 Reverse projection onto the plane z = 2:");
    let plane = Plane3::new(Vector3::new(0.0, 0.0, 2.0), Vector3::z())?;
    let camera_from_world = result.pose;
    let world_from_camera = camera_from_world.inverse();
    for pixel in sample_pixel_grid(&resolution, 9).into_iter().step_by(4) {
        let ray = match result.model.reverse_project(&pixel, true) {
            Ok(ray) => ray,
            Err(e) => {
                println!("  pixel ({:.1}, {:.1}): {}", pixel.x, pixel.y, e);
                continue;
            }
        };
        let origin = world_from_camera.transform_point(&ray.origin);
        let direction = world_from_camera.rotation * ray.direction;
        let world_ray = Ray3::new(origin, direction);
        match world_ray.intersect_plane(&plane) {
            Some(hit) => {
                let reprojected = truth.project(&pose.transform_point(&hit))?;
                let offset: Vector2<f64> = reprojected - pixel;
                println!(
                    "  pixel ({:.1}, {:.1}) -> ({:.4}, {:.4}, {:.4}), reprojection offset {:.2e}",
                    pixel.x,
                    pixel.y,
                    hit.x,
                    hit.y,
                    hit.z,
                    offset.norm()
                );
            }
            None => println!("  pixel ({:.1}, {:.1}) does not see the plane", pixel.x, pixel.y),
        }
    }

    // A circular fiducial seen off-axis: its image centroid is not the image of its center.
    println!("\n⭕ Fiducial centroid:");
    let fiducial = Circle3::new(
        pose.transform_point(&Vector3::new(0.5, 0.3, 2.0)),
        pose.rotation * Vector3::new(0.1, 0.0, 0.0),
        pose.rotation * Vector3::new(0.0, 0.1, 0.0),
    )?;
    let (area, centroid) = estimate_projected_area_and_centroid(&fiducial, &result.model, 80)?;
    let projected_center = result.model.project(&fiducial.origin)?;
    println!(
        "  area {:.3} px², centroid ({:.3}, {:.3}), projected center ({:.3}, {:.3})",
        area, centroid.x, centroid.y, projected_center.x, projected_center.y
    );

    if let Some(path) = &cli.report {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, result.report().to_json()?)?;
        println!("\n💾 Report written to {:?}", path);
    }

    Ok(())
}
