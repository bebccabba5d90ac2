//! Parameters structure for MpcCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use crate::traj_opt::{self, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Params {

    // ---- REFERENCE ----

    /// Degree of the polynomial fitted through the waypoints
    pub poly_degree: usize,

    /// Spacing along the Vehicle frame X axis of the reference points returned for display.
    ///
    /// Units: meters
    pub ref_display_spacing_m: f64,

    /// Number of reference points returned for display
    pub ref_display_num_points: usize,

    // ---- OUTPUT ----

    /// Delay between the end of a solve and the command being returned.
    ///
    /// Units: seconds
    pub actuation_delay_s: f64,

    /// What to command when no solution is available for a tick
    pub fallback_policy: FallbackPolicy,

    /// Invert the sign of the normalised steering command. The model turns right for positive
    /// steering, set this if the vehicle expects positive steering to turn left.
    pub invert_steering: bool,

    // ---- OPTIMISATION ----

    pub traj_opt: traj_opt::Params,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Command to use when the fit or the solve fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FallbackPolicy {
    /// Repeat the last command which came from a successful solve, or the neutral command if
    /// there is none.
    HoldLast,

    /// Centre the steering and apply the lowest throttle.
    SafeStop,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters, an invalid set must prevent the controller from starting.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.poly_degree < 1 {
            return Err(ParamsError::Invalid {
                name: "poly_degree",
                reason: "must be at least 1",
            });
        }

        if !self.ref_display_spacing_m.is_finite() || self.ref_display_spacing_m <= 0.0 {
            return Err(ParamsError::Invalid {
                name: "ref_display_spacing_m",
                reason: "must be positive",
            });
        }

        if !self.actuation_delay_s.is_finite() || self.actuation_delay_s < 0.0 {
            return Err(ParamsError::Invalid {
                name: "actuation_delay_s",
                reason: "must be finite and non-negative",
            });
        }

        self.traj_opt.validate()
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            poly_degree: 3,
            ref_display_spacing_m: 2.5,
            ref_display_num_points: 25,
            actuation_delay_s: 0.1,
            fallback_policy: FallbackPolicy::default(),
            invert_steering: false,
            traj_opt: traj_opt::Params::default(),
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::HoldLast
    }
}
