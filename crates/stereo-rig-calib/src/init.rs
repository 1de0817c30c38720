//! Closed-form starting points for the nonlinear refinement.

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use stereo_rig_core::{estimate_homography, Correspondence, Homography, ImageSize, Intrinsics, Pose};

use crate::CalibrationError;

/// Plane-to-image homography of one view.
pub(crate) fn view_homography(view: &Correspondence, index: usize) -> Result<Homography, CalibrationError> {
    estimate_homography(&view.plane_points(), view.image_points()).ok_or_else(|| {
        CalibrationError::GeometryDegenerate(format!(
            "view {index}: no homography (collinear or repeated points)"
        ))
    })
}

/// Focal lengths from the orthogonality of the homography columns, with
/// the principal point held at the image centre.
///
/// Each view contributes two equations: `h1 ⟂ h2` and
/// `(h1 + h2) ⟂ (h1 - h2)`, measured after removing the principal point.
pub(crate) fn initial_intrinsics(
    homographies: &[Homography],
    image_size: ImageSize,
    aspect_ratio: Option<f64>,
) -> Result<Intrinsics, CalibrationError> {
    let (cx, cy) = image_size.center();
    let a_inv = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let n = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 2);
    let mut b = DVector::<f64>::zeros(2 * n);

    for (i, h) in homographies.iter().enumerate() {
        let hc = a_inv * h.h;
        let c1 = hc.column(0).into_owned();
        let c2 = hc.column(1).into_owned();
        let d1 = (c1 + c2) * 0.5;
        let d2 = (c1 - c2) * 0.5;

        let [n0, n1, n2, n3] = [c1, c2, d1, d2].map(|v| {
            let norm = v.norm();
            if norm > 0.0 {
                v / norm
            } else {
                v
            }
        });

        a[(2 * i, 0)] = n0.x * n1.x;
        a[(2 * i, 1)] = n0.y * n1.y;
        b[2 * i] = -n0.z * n1.z;
        a[(2 * i + 1, 0)] = n2.x * n3.x;
        a[(2 * i + 1, 1)] = n2.y * n3.y;
        b[2 * i + 1] = -n2.z * n3.z;
    }

    let svd = a.svd(true, true);
    let f = svd
        .solve(&b, 1e-12)
        .map_err(|e| CalibrationError::failure(format!("focal initialisation: {e}"), n))?;

    let mut fx = (1.0 / f[0]).abs().sqrt();
    let mut fy = (1.0 / f[1]).abs().sqrt();
    if let Some(ratio) = aspect_ratio {
        // keep the geometric mean, impose the ratio
        let f = (fx * fy).sqrt();
        fy = f / ratio.sqrt();
        fx = ratio * fy;
    }
    if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
        return Err(CalibrationError::failure(
            format!("focal initialisation produced fx={fx}, fy={fy}; views are likely all fronto-parallel"),
            n,
        ));
    }
    debug!("initial intrinsics: fx={fx:.3} fy={fy:.3} cx={cx:.3} cy={cy:.3}");
    Ok(Intrinsics::new(fx, fy, cx, cy))
}

/// Pose of a z = 0 pattern from a plane-to-normalized-image homography.
///
/// The first two columns give the rotation up to a common scale; the
/// result is projected back onto SO(3) and the sign chosen so that the
/// pattern lies in front of the camera.
pub(crate) fn pose_from_normalized_homography(h: &Matrix3<f64>) -> Option<Pose> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let scale = 0.5 * (h1.norm() + h2.norm());
    if scale <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / scale;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<f64> = h3 * lambda;
    Some(Pose::new(Rotation3::from_matrix_unchecked(r_orth), t))
}
