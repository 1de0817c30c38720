use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform `x_cam = R * x + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// From a Rodrigues rotation vector (axis * angle) and a translation.
    pub fn from_rodrigues(rvec: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(rvec), translation)
    }

    pub fn rodrigues(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    /// `[rx, ry, rz, tx, ty, tz]`, the layout used by the solvers.
    pub fn to_params(&self) -> [f64; 6] {
        let r = self.rodrigues();
        let t = self.translation;
        [r.x, r.y, r.z, t.x, t.y, t.z]
    }

    pub fn from_params(p: &[f64]) -> Self {
        Self::from_rodrigues(
            Vector3::new(p[0], p[1], p[2]),
            Vector3::new(p[3], p[4], p[5]),
        )
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }

    pub fn inverse(&self) -> Pose {
        let r_inv = self.rotation.inverse();
        Pose::new(r_inv, -(r_inv * self.translation))
    }
}

/// Angle of a rotation in degrees.
pub fn rotation_angle_deg(r: &Rotation3<f64>) -> f64 {
    r.angle().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn params_round_trip() {
        let pose = Pose::from_rodrigues(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let back = Pose::from_params(&pose.to_params());
        assert_relative_eq!(back.rotation.matrix(), pose.rotation.matrix(), epsilon = 1e-12);
        assert_relative_eq!(back.translation, pose.translation);
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let pose = Pose::from_rodrigues(Vector3::new(0.4, 0.1, -0.2), Vector3::new(-0.5, 0.2, 1.5));
        let id = pose.compose(&pose.inverse());
        assert_relative_eq!(id.rotation.matrix(), Rotation3::identity().matrix(), epsilon = 1e-12);
        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
    }
}
