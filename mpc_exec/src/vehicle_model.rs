//! # Vehicle model
//!
//! Discrete time kinematic bicycle model, augmented with the cross track and heading errors
//! against a reference polynomial. All quantities are in the Vehicle frame captured at the start
//! of the horizon.
//!
//! With `f` the reference polynomial and `Lf` the distance from the front axle to the centre of
//! gravity, one step of `dt` seconds is:
//!
//! ```text
//! x'    = x + v cos(psi) dt
//! y'    = y + v sin(psi) dt
//! psi'  = psi - v / Lf * delta * dt
//! v'    = v + a dt
//! cte'  = f(x) - y + v sin(epsi) dt
//! epsi' = psi - atan(f'(x)) - v / Lf * delta * dt
//! ```
//!
//! A positive steering angle `delta` turns the vehicle clockwise (to the right).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix6, Matrix6x2};
use serde::{Deserialize, Serialize};

use crate::poly_fit::Polynomial;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of elements in the model state.
pub const NUM_STATES: usize = 6;

/// Number of actuator inputs.
pub const NUM_INPUTS: usize = 2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state of the model at one point on the horizon.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub x_m: f64,
    pub y_m: f64,

    /// Heading, radians
    pub psi_rad: f64,

    /// Speed, native simulator units
    pub v: f64,

    /// Cross track error
    pub cte_m: f64,

    /// Heading error, radians
    pub epsi_rad: f64,
}

/// Actuator inputs applied for one step.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuation {
    /// Steering angle, positive to the right.
    ///
    /// Units: radians
    pub delta_rad: f64,

    /// Longitudinal acceleration (throttle).
    pub accel: f64,
}

/// Kinematic bicycle model.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicBicycle {
    /// Distance from the front axle to the centre of gravity.
    ///
    /// Units: meters
    pub lf_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModelState {
    /// The state at the origin of the Vehicle frame, which is where every horizon starts.
    ///
    /// Position and heading are zero by definition of the frame, the errors are measured against
    /// the reference polynomial at `x = 0`.
    pub fn at_origin(speed: f64, reference: &Polynomial) -> Self {
        Self {
            x_m: 0.0,
            y_m: 0.0,
            psi_rad: 0.0,
            v: speed,
            cte_m: reference.eval(0.0),
            epsi_rad: -reference.deriv(0.0).atan(),
        }
    }

    pub fn to_array(&self) -> [f64; NUM_STATES] {
        [self.x_m, self.y_m, self.psi_rad, self.v, self.cte_m, self.epsi_rad]
    }

    pub fn from_array(s: [f64; NUM_STATES]) -> Self {
        let [x_m, y_m, psi_rad, v, cte_m, epsi_rad] = s;
        Self { x_m, y_m, psi_rad, v, cte_m, epsi_rad }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Actuation {
    pub fn to_array(&self) -> [f64; NUM_INPUTS] {
        [self.delta_rad, self.accel]
    }

    pub fn from_array(u: [f64; NUM_INPUTS]) -> Self {
        let [delta_rad, accel] = u;
        Self { delta_rad, accel }
    }
}

impl KinematicBicycle {
    pub fn new(lf_m: f64) -> Self {
        Self { lf_m }
    }

    /// Propagate the state forward by one step of `dt_s` seconds.
    pub fn step(
        &self,
        s: &ModelState,
        u: &Actuation,
        reference: &Polynomial,
        dt_s: f64,
    ) -> ModelState {
        let (sin_psi, cos_psi) = s.psi_rad.sin_cos();
        let yaw_step = s.v / self.lf_m * u.delta_rad * dt_s;

        ModelState {
            x_m: s.x_m + s.v * cos_psi * dt_s,
            y_m: s.y_m + s.v * sin_psi * dt_s,
            psi_rad: s.psi_rad - yaw_step,
            v: s.v + u.accel * dt_s,
            cte_m: reference.eval(s.x_m) - s.y_m + s.v * s.epsi_rad.sin() * dt_s,
            epsi_rad: s.psi_rad - reference.deriv(s.x_m).atan() - yaw_step,
        }
    }

    /// Jacobians of [`KinematicBicycle::step`] with respect to the state (`A`) and the actuation
    /// (`B`), evaluated at `(s, u)`.
    ///
    /// Rows and columns follow the order of [`ModelState::to_array`] and
    /// [`Actuation::to_array`].
    pub fn jacobians(
        &self,
        s: &ModelState,
        u: &Actuation,
        reference: &Polynomial,
        dt_s: f64,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let (sin_psi, cos_psi) = s.psi_rad.sin_cos();
        let (sin_epsi, cos_epsi) = s.epsi_rad.sin_cos();
        let slope = reference.deriv(s.x_m);
        let curvature = reference.second_deriv(s.x_m);

        let d_yaw_d_v = -u.delta_rad * dt_s / self.lf_m;
        let d_yaw_d_delta = -s.v * dt_s / self.lf_m;

        let mut a = Matrix6::zeros();
        let mut b = Matrix6x2::zeros();

        // x
        a[(0, 0)] = 1.0;
        a[(0, 2)] = -s.v * sin_psi * dt_s;
        a[(0, 3)] = cos_psi * dt_s;

        // y
        a[(1, 1)] = 1.0;
        a[(1, 2)] = s.v * cos_psi * dt_s;
        a[(1, 3)] = sin_psi * dt_s;

        // psi
        a[(2, 2)] = 1.0;
        a[(2, 3)] = d_yaw_d_v;
        b[(2, 0)] = d_yaw_d_delta;

        // v
        a[(3, 3)] = 1.0;
        b[(3, 1)] = dt_s;

        // cte
        a[(4, 0)] = slope;
        a[(4, 1)] = -1.0;
        a[(4, 3)] = sin_epsi * dt_s;
        a[(4, 5)] = s.v * cos_epsi * dt_s;

        // epsi
        a[(5, 0)] = -curvature / (1.0 + slope * slope);
        a[(5, 2)] = 1.0;
        a[(5, 3)] = d_yaw_d_v;
        b[(5, 0)] = d_yaw_d_delta;

        (a, b)
    }
}

impl Default for KinematicBicycle {
    fn default() -> Self {
        Self { lf_m: 2.67 }
    }
}
