//! # MPC control module
//!
//! MPC control runs one receding horizon control update per telemetry tick. On each tick the
//! reference waypoints are moved into the Vehicle frame, a cubic is fitted through them, and the
//! trajectory optimiser is asked for the actuation which best follows that cubic. Only the first
//! actuation of the optimised sequence is applied, the rest is discarded and the whole problem is
//! solved again on the next tick.
//!
//! If the fit or the solve fails the configured [`FallbackPolicy`] decides the command instead,
//! so the output is never undefined. Output is held back by the configured actuation delay before
//! it is returned, modelling the latency of the real actuators.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

use crate::{frame::FrameError, traj_opt::ParamsError};
use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Could not load the parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(ParamsError),

    #[error("Could not create the archives: {0}")]
    ArchiveError(ArchiveError),

    #[error("Telemetry rejected: {0}")]
    InvalidInput(FrameError),

    #[error("A solve is already in progress, the tick has been dropped")]
    Busy,
}
