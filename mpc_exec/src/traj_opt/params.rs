//! Trajectory optimisation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for trajectory optimisation.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Params {

    // ---- HORIZON ----

    /// Number of states in the horizon, including the initial state. The horizon holds one
    /// actuation fewer than this.
    pub horizon_len: usize,

    /// Time between consecutive states.
    ///
    /// Units: seconds
    pub time_step_s: f64,

    // ---- VEHICLE ----

    /// Distance between the front axle and the centre of gravity.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Maximum absolute steering angle.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Lowest acceleration (throttle) demand
    pub min_accel: f64,

    /// Highest acceleration (throttle) demand
    pub max_accel: f64,

    /// Reference speed, in the simulator's native units
    pub ref_speed: f64,

    // ---- COST ----

    pub weights: CostWeights,

    // ---- SOLVER ----

    pub solver: SolverParams,
}

/// Weights of each term in the cost.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steer: f64,
    pub accel: f64,

    /// Change in steering between consecutive actuations
    pub steer_rate: f64,

    /// Change in acceleration between consecutive actuations
    pub accel_rate: f64,
}

/// Budgets and tolerances of the SQP solver.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SolverParams {
    /// Maximum number of SQP iterations per solve
    pub max_iters: u32,

    /// Maximum wall clock time per solve.
    ///
    /// Units: seconds
    pub max_time_s: f64,

    /// Convergence threshold on the infinity norm of the step, relative to `1 + |z|`
    pub step_tol: f64,

    /// Convergence threshold on the infinity norm of the constraint violation
    pub feas_tol: f64,

    /// Maximum number of ADMM iterations of each QP subproblem
    pub qp_max_iters: u32,

    /// Absolute and relative tolerance of each QP subproblem
    pub qp_eps: f64,

    /// Diagonal regularisation added to the Hessian
    pub hessian_reg: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("Invalid value of {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters describe a solvable problem.
    pub fn validate(&self) -> Result<(), ParamsError> {
        check(self.horizon_len >= 2, "horizon_len", "must be at least 2")?;
        check(positive(self.time_step_s), "time_step_s", "must be positive")?;
        check(positive(self.lf_m), "lf_m", "must be positive")?;
        check(positive(self.max_steer_rad), "max_steer_rad", "must be positive")?;
        check(
            self.min_accel.is_finite() && self.max_accel.is_finite(),
            "min_accel/max_accel",
            "must be finite"
        )?;
        check(self.min_accel < self.max_accel, "min_accel", "must be less than max_accel")?;
        check(self.ref_speed.is_finite(), "ref_speed", "must be finite")?;

        let w = &self.weights;
        for &(name, value) in &[
            ("weights.cte", w.cte),
            ("weights.epsi", w.epsi),
            ("weights.speed", w.speed),
            ("weights.steer", w.steer),
            ("weights.accel", w.accel),
            ("weights.steer_rate", w.steer_rate),
            ("weights.accel_rate", w.accel_rate),
        ] {
            check(value.is_finite() && value >= 0.0, name, "must be finite and non-negative")?;
        }

        let s = &self.solver;
        check(s.max_iters > 0, "solver.max_iters", "must be positive")?;
        check(positive(s.max_time_s), "solver.max_time_s", "must be positive")?;
        check(positive(s.step_tol), "solver.step_tol", "must be positive")?;
        check(positive(s.feas_tol), "solver.feas_tol", "must be positive")?;
        check(s.qp_max_iters > 0, "solver.qp_max_iters", "must be positive")?;
        check(positive(s.qp_eps), "solver.qp_eps", "must be positive")?;
        check(
            s.hessian_reg.is_finite() && s.hessian_reg >= 0.0,
            "solver.hessian_reg",
            "must be finite and non-negative"
        )?;

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            horizon_len: 10,
            time_step_s: 0.1,
            lf_m: 2.67,
            max_steer_rad: 25f64.to_radians(),
            min_accel: -1.0,
            max_accel: 1.0,
            ref_speed: 40.0,
            weights: CostWeights::default(),
            solver: SolverParams::default(),
        }
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 3000.0,
            epsi: 3000.0,
            speed: 1.0,
            steer: 5.0,
            accel: 5.0,
            steer_rate: 200.0,
            accel_rate: 10.0,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iters: 50,
            max_time_s: 0.5,
            step_tol: 1e-4,
            feas_tol: 1e-4,
            qp_max_iters: 4000,
            qp_eps: 1e-6,
            hessian_reg: 1e-6,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn check(cond: bool, name: &'static str, reason: &'static str) -> Result<(), ParamsError> {
    match cond {
        true => Ok(()),
        false => Err(ParamsError::Invalid { name, reason }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Params::default().validate(), Ok(()));
    }

    #[test]
    fn test_invalid() {
        let mut p = Params::default();
        p.horizon_len = 1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.min_accel = 1.0;
        assert_eq!(
            p.validate(),
            Err(ParamsError::Invalid {
                name: "min_accel",
                reason: "must be less than max_accel"
            })
        );

        let mut p = Params::default();
        p.weights.steer_rate = -1.0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.solver.max_time_s = std::f64::NAN;
        assert!(p.validate().is_err());
    }
}
