//! Noise-free synthetic views for tests, benches and demos.

use nalgebra::{Point2, Point3, Rotation3, Unit, Vector3};

use crate::camera::CameraModel;
use crate::correspondence::{Correspondence, CorrespondenceError, PatternSize};
use crate::pose::Pose;

/// Project every pattern point through `camera` at `pose`.
pub fn project_points(camera: &CameraModel, pose: &Pose, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
    points.iter().map(|p| camera.project(pose, p)).collect()
}

/// One ideal view of `pattern` as seen by `camera` at `pose`.
pub fn synthetic_view(
    camera: &CameraModel,
    pose: &Pose,
    pattern: PatternSize,
    square_size: f64,
) -> Result<Correspondence, CorrespondenceError> {
    let object = pattern.object_points(square_size);
    let image = project_points(camera, pose, &object);
    Correspondence::new(object, image)
}

/// Poses looking at the pattern centre from `distance`, tilted by
/// `tilt_deg` about axes spread evenly around the optical axis.
///
/// Distinct tilt directions keep the homography-based focal estimate
/// well conditioned.
pub fn orbit_poses(
    count: usize,
    pattern: PatternSize,
    square_size: f64,
    distance: f64,
    tilt_deg: f64,
) -> Vec<Pose> {
    let center = Vector3::new(
        (pattern.cols.saturating_sub(1)) as f64 * square_size * 0.5,
        (pattern.rows.saturating_sub(1)) as f64 * square_size * 0.5,
        0.0,
    );
    (0..count)
        .map(|i| {
            let phi = std::f64::consts::TAU * i as f64 / count.max(1) as f64;
            let axis = Unit::new_normalize(Vector3::new(phi.cos(), phi.sin(), 0.0));
            let tilt = Rotation3::from_axis_angle(&axis, tilt_deg.to_radians());
            let roll = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.05 * i as f64);
            let rotation = roll * tilt;
            // small lateral offsets so the views do not all share one centre
            let offset = Vector3::new(0.02 * phi.sin(), -0.015 * phi.cos(), 0.05 * i as f64 / count.max(1) as f64);
            let translation = Vector3::new(0.0, 0.0, distance) + offset - rotation * center;
            Pose::new(rotation, translation)
        })
        .collect()
}

/// Left/right views of the same pattern positions for a rig whose right
/// camera sits at `right_from_left` relative to the left one.
pub fn stereo_views(
    left: &CameraModel,
    right: &CameraModel,
    right_from_left: &Pose,
    left_poses: &[Pose],
    pattern: PatternSize,
    square_size: f64,
) -> Result<(Vec<Correspondence>, Vec<Correspondence>), CorrespondenceError> {
    let mut lv = Vec::with_capacity(left_poses.len());
    let mut rv = Vec::with_capacity(left_poses.len());
    for pose in left_poses {
        lv.push(synthetic_view(left, pose, pattern, square_size)?);
        let right_pose = right_from_left.compose(pose);
        rv.push(synthetic_view(right, &right_pose, pattern, square_size)?);
    }
    Ok((lv, rv))
}
