//! Packing of camera models and poses into the solver's flat vector.

use stereo_rig_core::{CameraModel, Distortion, Intrinsics, Pose};

use crate::params::DistortionParams;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum FocalMode {
    Free,
    /// One parameter `fy`; `fx = ratio * fy`.
    FixedAspect(f64),
    Fixed,
    /// Taken from another camera at unpack time.
    Shared,
}

/// Maps the free entries of one camera model to a parameter slice.
#[derive(Clone, Debug)]
pub(crate) struct CameraLayout {
    base: CameraModel,
    focal: FocalMode,
    principal_point_free: bool,
    distortion_free: [bool; 8],
}

impl CameraLayout {
    pub fn new(
        base: CameraModel,
        focal: FocalMode,
        fix_principal_point: bool,
        distortion: &DistortionParams,
    ) -> Self {
        let mut base = base;
        for (c, zero) in base
            .distortion
            .coeffs
            .iter_mut()
            .zip(distortion.forced_zero())
        {
            if zero {
                *c = 0.0;
            }
        }
        Self {
            base,
            focal,
            principal_point_free: !fix_principal_point,
            distortion_free: distortion.free_mask(),
        }
    }

    /// Everything fixed; the camera only contributes residuals.
    pub fn fixed(base: CameraModel) -> Self {
        Self {
            base,
            focal: FocalMode::Fixed,
            principal_point_free: false,
            distortion_free: [false; 8],
        }
    }

    pub fn base(&self) -> &CameraModel {
        &self.base
    }

    pub fn len(&self) -> usize {
        let focal = match self.focal {
            FocalMode::Free => 2,
            FocalMode::FixedAspect(_) => 1,
            FocalMode::Fixed | FocalMode::Shared => 0,
        };
        let pp = if self.principal_point_free { 2 } else { 0 };
        focal + pp + self.distortion_free.iter().filter(|f| **f).count()
    }

    pub fn pack(&self, out: &mut Vec<f64>) {
        let k = &self.base.intrinsics;
        match self.focal {
            FocalMode::Free => out.extend([k.fx, k.fy]),
            FocalMode::FixedAspect(_) => out.push(k.fy),
            FocalMode::Fixed | FocalMode::Shared => {}
        }
        if self.principal_point_free {
            out.extend([k.cx, k.cy]);
        }
        for (c, free) in self.base.distortion.coeffs.iter().zip(self.distortion_free) {
            if free {
                out.push(*c);
            }
        }
    }

    /// Rebuild the model from `p` (exactly `len()` values). `shared` supplies
    /// `(fx, fy)` for [`FocalMode::Shared`].
    pub fn unpack(&self, p: &[f64], shared: Option<(f64, f64)>) -> CameraModel {
        let b = &self.base.intrinsics;
        let mut i = 0;
        let (fx, fy) = match self.focal {
            FocalMode::Free => {
                i = 2;
                (p[0], p[1])
            }
            FocalMode::FixedAspect(ratio) => {
                i = 1;
                (ratio * p[0], p[0])
            }
            FocalMode::Fixed => (b.fx, b.fy),
            FocalMode::Shared => shared.unwrap_or((b.fx, b.fy)),
        };
        let (cx, cy) = if self.principal_point_free {
            let c = (p[i], p[i + 1]);
            i += 2;
            c
        } else {
            (b.cx, b.cy)
        };
        let mut coeffs = self.base.distortion.coeffs;
        for (c, free) in coeffs.iter_mut().zip(self.distortion_free) {
            if free {
                *c = p[i];
                i += 1;
            }
        }
        CameraModel::new(
            Intrinsics::new(fx, fy, cx, cy),
            Distortion::new(coeffs),
            self.base.image_size,
        )
    }
}

pub(crate) fn pack_poses(poses: &[Pose], out: &mut Vec<f64>) {
    for pose in poses {
        out.extend(pose.to_params());
    }
}

pub(crate) fn unpack_poses(p: &[f64]) -> Vec<Pose> {
    p.chunks_exact(6).map(Pose::from_params).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_rig_core::ImageSize;

    fn model() -> CameraModel {
        CameraModel::new(
            Intrinsics::new(700.0, 710.0, 320.0, 240.0),
            Distortion::new([0.1, -0.02, 0.001, 0.002, 0.003, 0.0, 0.0, 0.01]),
            ImageSize::new(640, 480),
        )
    }

    #[test]
    fn pack_unpack_is_lossless() {
        let layout = CameraLayout::new(model(), FocalMode::Free, false, &DistortionParams::default());
        let mut p = Vec::new();
        layout.pack(&mut p);
        assert_eq!(p.len(), layout.len());
        assert_eq!(layout.unpack(&p, None), *layout.base());
    }

    #[test]
    fn fixed_aspect_ties_fx_to_fy() {
        let layout = CameraLayout::new(
            model(),
            FocalMode::FixedAspect(2.0),
            true,
            &DistortionParams::none(),
        );
        assert_eq!(layout.len(), 1);
        let cam = layout.unpack(&[500.0], None);
        assert_eq!(cam.intrinsics.fx, 1000.0);
        assert_eq!(cam.intrinsics.cx, 320.0);
        // tangential and rational terms are forced to zero
        assert_eq!(cam.distortion.coeffs[2], 0.0);
        assert_eq!(cam.distortion.coeffs[7], 0.0);
        assert_eq!(cam.distortion.coeffs[0], 0.1);
    }

    #[test]
    fn shared_focal_comes_from_caller() {
        let layout = CameraLayout::new(model(), FocalMode::Shared, true, &DistortionParams::none());
        let cam = layout.unpack(&[], Some((900.0, 901.0)));
        assert_eq!((cam.intrinsics.fx, cam.intrinsics.fy), (900.0, 901.0));
    }
}
