//! Cyclic module interface
//!
//! A cyclic module is set up once from its parameter file and then driven by
//! the executable's main loop, one `proc` call per received input. Modules in
//! `mpc_exec` (currently only `mpc_ctrl`) implement [`State`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// Lifecycle of a cyclic module.
pub trait State {
    /// What `init` needs, usually the name of the module's parameter file.
    type InitData;
    /// Returned when the module cannot be set up.
    type InitError;

    /// One cycle's worth of input.
    type InputData;
    /// The product of one cycle, forwarded by the executable.
    type OutputData;
    /// Diagnostics for one cycle, suitable for logging and archiving.
    type StatusReport;
    /// Returned when a cycle is rejected. The module must be left in a state
    /// where the next `proc` call can still succeed.
    type ProcError;

    /// Set the module up.
    ///
    /// When `session` is `None` (unit tests, benches) the module runs without
    /// archives.
    fn init(&mut self, init_data: Self::InitData, session: Option<&Session>)
        -> Result<(), Self::InitError>;

    /// Run a single cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
