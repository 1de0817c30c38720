//! Least-squares problems whose residuals split into independent views.
//!
//! Parameters are `[globals | pose_0 | pose_1 | ...]` with six pose values
//! (Rodrigues + translation) per view. Residuals of view `k` depend on the
//! globals and on pose `k` only, which keeps the jacobian block-sparse and
//! lets views be evaluated in parallel.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use stereo_rig_core::{LeastSquaresProblem, Pose};

pub(crate) const POSE_LEN: usize = 6;

pub(crate) trait ViewModel: Sync {
    type Globals: Sync;

    fn num_globals(&self) -> usize;
    fn num_views(&self) -> usize;
    fn view_residual_count(&self, view: usize) -> usize;
    fn decode(&self, globals: &[f64]) -> Self::Globals;
    fn view_residuals(&self, globals: &Self::Globals, view: usize, pose: &Pose, out: &mut Vec<f64>);
}

pub(crate) struct PerViewProblem<'a, M: ViewModel> {
    model: &'a M,
    offsets: Vec<usize>,
    total: usize,
}

impl<'a, M: ViewModel> PerViewProblem<'a, M> {
    pub fn new(model: &'a M) -> Self {
        let mut offsets = Vec::with_capacity(model.num_views());
        let mut total = 0;
        for k in 0..model.num_views() {
            offsets.push(total);
            total += model.view_residual_count(k);
        }
        Self {
            model,
            offsets,
            total,
        }
    }

    fn pose(&self, p: &[f64], view: usize) -> Pose {
        let start = self.model.num_globals() + POSE_LEN * view;
        Pose::from_params(&p[start..start + POSE_LEN])
    }

    fn eval_view(&self, globals: &M::Globals, p: &[f64], view: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.model.view_residual_count(view));
        self.model
            .view_residuals(globals, view, &self.pose(p, view), &mut out);
        out
    }

    fn eval_all(&self, p: &[f64]) -> Vec<f64> {
        let globals = self.model.decode(&p[..self.model.num_globals()]);
        let per_view: Vec<Vec<f64>> = (0..self.model.num_views())
            .into_par_iter()
            .map(|k| self.eval_view(&globals, p, k))
            .collect();
        per_view.concat()
    }
}

fn fd_step(x: f64) -> f64 {
    1e-6 * x.abs().max(1.0)
}

impl<M: ViewModel> LeastSquaresProblem for PerViewProblem<'_, M> {
    fn num_residuals(&self) -> usize {
        self.total
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(self.eval_all(params.as_slice()))
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let p = params.as_slice();
        let ng = self.model.num_globals();
        let mut jac = DMatrix::<f64>::zeros(self.total, p.len());

        // dense columns: every view sees the globals
        let global_cols: Vec<Vec<f64>> = (0..ng)
            .into_par_iter()
            .map(|j| {
                let h = fd_step(p[j]);
                let mut x = p.to_vec();
                x[j] = p[j] + h;
                let fp = self.eval_all(&x);
                x[j] = p[j] - h;
                let fm = self.eval_all(&x);
                fp.iter()
                    .zip(&fm)
                    .map(|(a, b)| (a - b) / (2.0 * h))
                    .collect()
            })
            .collect();
        for (j, col) in global_cols.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                jac[(i, j)] = *v;
            }
        }

        // pose columns only touch their own view's rows
        let globals = self.model.decode(&p[..ng]);
        let pose_blocks: Vec<[Vec<f64>; POSE_LEN]> = (0..self.model.num_views())
            .into_par_iter()
            .map(|k| {
                let start = ng + POSE_LEN * k;
                let mut x = p.to_vec();
                std::array::from_fn(|c| {
                    let j = start + c;
                    let h = fd_step(p[j]);
                    x[j] = p[j] + h;
                    let fp = self.eval_view(&globals, &x, k);
                    x[j] = p[j] - h;
                    let fm = self.eval_view(&globals, &x, k);
                    x[j] = p[j];
                    fp.iter()
                        .zip(&fm)
                        .map(|(a, b)| (a - b) / (2.0 * h))
                        .collect()
                })
            })
            .collect();
        for (k, block) in pose_blocks.iter().enumerate() {
            let row0 = self.offsets[k];
            for (c, col) in block.iter().enumerate() {
                let j = ng + POSE_LEN * k + c;
                for (i, v) in col.iter().enumerate() {
                    jac[(row0 + i, j)] = *v;
                }
            }
        }
        jac
    }
}
