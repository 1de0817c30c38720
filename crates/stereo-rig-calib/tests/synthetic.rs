use approx::assert_relative_eq;
use nalgebra::{Rotation3, Vector3};
use stereo_rig_calib::{
    calibrate_intrinsics, calibrate_stereo, reprojection_errors, CalibrationError,
    DistortionParams, IntrinsicCalibrationParams, StereoCalibrationParams,
};
use stereo_rig_core::synthetic::{orbit_poses, stereo_views, synthetic_view};
use stereo_rig_core::{
    rotation_angle_deg, CameraModel, Correspondence, Distortion, ImageSize, Intrinsics,
    PatternSize, Pose,
};

fn pinhole(fx: f64, fy: f64) -> CameraModel {
    CameraModel::new(
        Intrinsics::new(fx, fy, 322.0, 236.0),
        Distortion::none(),
        ImageSize::new(640, 480),
    )
}

fn views(cam: &CameraModel, pattern: PatternSize, count: usize, tilt: f64) -> Vec<Correspondence> {
    orbit_poses(count, pattern, 0.03, 0.5, tilt)
        .iter()
        .map(|pose| synthetic_view(cam, pose, pattern, 0.03).expect("view"))
        .collect()
}

fn pinhole_params() -> IntrinsicCalibrationParams {
    IntrinsicCalibrationParams {
        distortion: DistortionParams::none(),
        ..Default::default()
    }
}

#[test]
fn three_views_of_five_by_four_grid_recover_focal() {
    let truth = pinhole(800.0, 800.0);
    let views = views(&truth, PatternSize::new(5, 4), 3, 25.0);

    let result = calibrate_intrinsics(&views, truth.image_size, &pinhole_params()).expect("calibrate");

    let k = result.model.intrinsics;
    assert!((k.fx - 800.0).abs() / 800.0 < 0.01, "fx = {}", k.fx);
    assert!((k.fy - 800.0).abs() / 800.0 < 0.01, "fy = {}", k.fy);
    assert!(result.rms_error < 0.1, "rms = {}", result.rms_error);
    assert_eq!(result.poses.len(), 3);
}

#[test]
fn reprojection_round_trip_is_within_reported_residual() {
    let truth = pinhole(760.0, 770.0);
    let views = views(&truth, PatternSize::new(7, 5), 5, 25.0);
    let result = calibrate_intrinsics(&views, truth.image_size, &pinhole_params()).expect("calibrate");

    let per_view = reprojection_errors(&result.model, &result.poses, &views);
    assert_eq!(per_view.len(), views.len());
    for (a, b) in per_view.iter().zip(&result.per_view_errors) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }

    // no single point can be further off than rms * sqrt(point count)
    let total: usize = views.iter().map(|v| v.len()).sum();
    let bound = result.rms_error * (total as f64).sqrt() + 1e-9;
    for (view, pose) in views.iter().zip(&result.poses) {
        for (obj, img) in view.iter() {
            let err = (result.model.project(pose, obj) - img).norm();
            assert!(err <= bound, "point off by {err}, bound {bound}");
        }
    }
}

#[test]
fn calibration_is_idempotent() {
    let truth = pinhole(800.0, 805.0);
    let views = views(&truth, PatternSize::new(6, 4), 4, 20.0);
    let params = pinhole_params();
    let a = calibrate_intrinsics(&views, truth.image_size, &params).expect("first");
    let b = calibrate_intrinsics(&views, truth.image_size, &params).expect("second");
    assert_relative_eq!(a.model.intrinsics.fx, b.model.intrinsics.fx, epsilon = 1e-9);
    assert_relative_eq!(a.model.intrinsics.cy, b.model.intrinsics.cy, epsilon = 1e-9);
    assert_relative_eq!(a.rms_error, b.rms_error, epsilon = 1e-9);
}

#[test]
fn radial_distortion_is_recovered() {
    let truth = CameraModel::new(
        Intrinsics::new(780.0, 780.0, 318.0, 242.0),
        Distortion::new([-0.2, 0.08, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ImageSize::new(640, 480),
    );
    let pattern = PatternSize::new(9, 6);
    let views: Vec<_> = orbit_poses(8, pattern, 0.03, 0.45, 30.0)
        .iter()
        .map(|pose| synthetic_view(&truth, pose, pattern, 0.03).expect("view"))
        .collect();
    let params = IntrinsicCalibrationParams {
        max_iterations: 100,
        distortion: DistortionParams::radial_tangential(),
        ..Default::default()
    };
    let result = calibrate_intrinsics(&views, truth.image_size, &params).expect("calibrate");
    assert!(result.rms_error < 0.01, "rms = {}", result.rms_error);
    assert!((result.model.intrinsics.fx - 780.0).abs() < 2.0);
    assert!((result.model.distortion.coeffs[0] + 0.2).abs() < 0.02);
}

fn stereo_fixture(rt: &Pose) -> (CameraModel, Vec<Correspondence>, Vec<Correspondence>) {
    let cam = pinhole(700.0, 700.0);
    let pattern = PatternSize::new(8, 6);
    let poses = orbit_poses(6, pattern, 0.03, 0.7, 25.0)
        .into_iter()
        .map(|p| {
            // centre the pattern between both cameras
            Pose::new(p.rotation, p.translation + Vector3::new(0.05, 0.0, 0.0))
        })
        .collect::<Vec<_>>();
    let (l, r) = stereo_views(&cam, &cam, rt, &poses, pattern, 0.03).expect("views");
    (cam, l, r)
}

#[test]
fn hundred_millimetre_baseline_is_recovered() {
    let rt = Pose::new(Rotation3::identity(), Vector3::new(-100.0e-3, 0.0, 0.0));
    let (cam, left, right) = stereo_fixture(&rt);

    let params = StereoCalibrationParams {
        distortion: DistortionParams::none(),
        ..Default::default()
    };
    let result = calibrate_stereo(&left, &right, &cam, &cam, &params).expect("stereo");

    let baseline = result.model.translation.norm();
    assert!((baseline - 0.1).abs() / 0.1 < 0.01, "|T| = {baseline}");
    assert!(rotation_angle_deg(&result.model.rotation) < 0.1);
    assert!(result.epipolar_error < 1.0, "epipolar = {}", result.epipolar_error);
    assert!(result.rms_error < 0.1);
}

#[test]
fn stereo_from_perturbed_intrinsics_converges() {
    let rt = Pose::new(
        Rotation3::from_euler_angles(0.0, 0.03, 0.0),
        Vector3::new(-0.12, 0.003, 0.0),
    );
    let (cam, left, right) = stereo_fixture(&rt);
    let mut guess = cam;
    guess.intrinsics.fx *= 1.02;
    guess.intrinsics.fy *= 1.02;
    guess.intrinsics.cx += 3.0;

    let params = StereoCalibrationParams {
        distortion: DistortionParams::none(),
        ..Default::default()
    };
    let result = calibrate_stereo(&left, &right, &guess, &guess, &params).expect("stereo");
    assert!((result.model.left.intrinsics.fx - 700.0).abs() < 1.0);
    assert_eq!(result.model.left.intrinsics.fx, result.model.right.intrinsics.fx);
    assert!(result.epipolar_error < 1.0);
}

#[test]
fn fixed_intrinsics_keep_camera_models() {
    let rt = Pose::new(Rotation3::identity(), Vector3::new(-0.1, 0.0, 0.0));
    let (cam, left, right) = stereo_fixture(&rt);
    let params = StereoCalibrationParams {
        fix_intrinsics: true,
        ..Default::default()
    };
    let result = calibrate_stereo(&left, &right, &cam, &cam, &params).expect("stereo");
    assert_eq!(result.model.left, cam);
    assert_eq!(result.model.right, cam);
}

#[test]
fn misaligned_point_counts_are_rejected() {
    let rt = Pose::new(Rotation3::identity(), Vector3::new(-0.1, 0.0, 0.0));
    let (cam, left, mut right) = stereo_fixture(&rt);
    let short = Correspondence::new(
        right[1].object_points()[..10].to_vec(),
        right[1].image_points()[..10].to_vec(),
    )
    .expect("short view");
    right[1] = short;
    let err = calibrate_stereo(&left, &right, &cam, &cam, &Default::default()).unwrap_err();
    assert!(matches!(err, CalibrationError::Configuration(msg) if msg.contains("view 1")));
}
