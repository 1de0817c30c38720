//! Dense Levenberg–Marquardt over a flat parameter vector.
//!
//! Problems only provide residuals (and optionally an analytic jacobian);
//! the camera-specific parametrisation stays with the caller. The trust
//! region iteration itself is delegated to the `levenberg-marquardt` crate
//! through a small adapter.

use levenberg_marquardt::{LevenbergMarquardt as LmSolver, TerminationReason};
use log::debug;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LmError {
    #[error("residuals are not finite at the initial parameters")]
    NonFinite,
    #[error("problem has {residuals} residuals for {params} parameters")]
    Underdetermined { residuals: usize, params: usize },
    #[error("invalid solver parameters: {0}")]
    InvalidParams(String),
    #[error("solver stopped: {0}")]
    Terminated(String),
}

/// Nonlinear least-squares problem `min ½‖r(x)‖²`.
pub trait LeastSquaresProblem {
    fn num_residuals(&self) -> usize;

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Central finite differences, step `1e-6 · max(1, |x_j|)`.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let n = params.len();
        let m = self.num_residuals();
        let mut jac = DMatrix::<f64>::zeros(m, n);
        let mut x = params.clone();
        for j in 0..n {
            let xj = params[j];
            let h = 1e-6 * xj.abs().max(1.0);
            x[j] = xj + h;
            let fp = self.residuals(&x);
            x[j] = xj - h;
            let fm = self.residuals(&x);
            x[j] = xj;
            let col = (fp - fm) / (2.0 * h);
            jac.set_column(j, &col);
        }
        jac
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    Converged,
    /// Ran out of evaluations before meeting any tolerance.
    IterationLimit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmParams {
    /// Evaluation budget per parameter: the solver stops after
    /// `max_iterations · (n + 1)` residual evaluations.
    pub max_iterations: usize,
    /// Relative tolerance on cost decrease and step size; the gradient
    /// test uses `epsilon²`.
    pub epsilon: f64,
    /// Initial trust-region radius, relative to the scaled parameters.
    pub step_bound: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 1e-5,
            step_bound: 100.0,
        }
    }
}

impl LmParams {
    pub fn with_criteria(max_iterations: usize, epsilon: f64) -> Self {
        Self {
            max_iterations,
            epsilon,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LmError> {
        if self.max_iterations == 0 {
            return Err(LmError::InvalidParams("max_iterations must be > 0".into()));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(LmError::InvalidParams(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if !(self.step_bound.is_finite() && self.step_bound > 0.0) {
            return Err(LmError::InvalidParams(format!(
                "step_bound must be positive, got {}",
                self.step_bound
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LmReport {
    pub params: DVector<f64>,
    /// Final `½‖r‖²`.
    pub cost: f64,
    pub initial_cost: f64,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub convergence: Convergence,
}

impl LmReport {
    pub fn converged(&self) -> bool {
        self.convergence == Convergence::Converged
    }
}

#[derive(Clone, Debug, Default)]
pub struct LevenbergMarquardt {
    params: LmParams,
}

/// Exposes a [`LeastSquaresProblem`] through the stateful interface of the
/// `levenberg-marquardt` crate.
struct LmAdapter<'a, P: ?Sized> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P> levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn> for LmAdapter<'_, P>
where
    P: LeastSquaresProblem + ?Sized,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

fn convergence_of(reason: &TerminationReason) -> Result<Convergence, LmError> {
    match reason {
        TerminationReason::LostPatience => Ok(Convergence::IterationLimit),
        // Tolerances below machine precision: the current point is as good
        // as it gets.
        TerminationReason::NoImprovementPossible(_) => Ok(Convergence::Converged),
        reason if reason.was_successful() => Ok(Convergence::Converged),
        TerminationReason::Numerical(what) => Err(LmError::Terminated(format!(
            "non-finite {what} during iteration"
        ))),
        reason => Err(LmError::Terminated(format!("{reason:?}"))),
    }
}

impl LevenbergMarquardt {
    pub fn new(params: LmParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LmParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(n = x0.len()))
    )]
    pub fn minimize<P: LeastSquaresProblem + ?Sized>(
        &self,
        problem: &P,
        x0: DVector<f64>,
    ) -> Result<LmReport, LmError> {
        self.params.validate()?;
        let m = problem.num_residuals();
        if m < x0.len() {
            return Err(LmError::Underdetermined {
                residuals: m,
                params: x0.len(),
            });
        }

        let r0 = problem.residuals(&x0);
        if r0.iter().any(|v| !v.is_finite()) {
            return Err(LmError::NonFinite);
        }
        let initial_cost = 0.5 * r0.norm_squared();

        let eps = self.params.epsilon;
        let solver = LmSolver::new()
            .with_ftol(eps)
            .with_xtol(eps)
            .with_gtol(eps * eps)
            .with_stepbound(self.params.step_bound)
            .with_patience(self.params.max_iterations);
        let adapter = LmAdapter {
            problem,
            params: x0,
        };
        let (adapter, report) = solver.minimize(adapter);
        let convergence = convergence_of(&report.termination)?;
        let cost = report.objective_function;

        debug!(
            "lm finished after {} evaluations: cost {initial_cost:.6e} -> {cost:.6e} ({:?})",
            report.number_of_evaluations, report.termination
        );

        Ok(LmReport {
            params: adapter.params,
            cost,
            initial_cost,
            iterations: report.number_of_evaluations,
            convergence,
        })
    }
}
