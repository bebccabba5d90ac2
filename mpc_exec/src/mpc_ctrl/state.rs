//! Implementations for the MpcCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serde::Serialize;
use std::{thread, time::Duration};

// Internal
use super::{FallbackPolicy, MpcCtrlError, Params};
use crate::{
    frame::{self, Pose},
    poly_fit::{self, Polynomial},
    traj_opt::{TrajOpt, TrajOptSolution},
    vehicle_model::ModelState,
};
use comms_if::sim::{manual_frame, ActuatorCmd, Telemetry};
use nalgebra::Vector2;
use util::{
    archive::{ArchiveError, Archived, Archiver},
    maths::{clamp, lin_map},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// MPC control module state
#[derive(Default)]
pub struct MpcCtrl {
    pub(crate) params: Params,

    traj_opt: TrajOpt,

    pub(crate) mode: Mode,

    /// The last command produced by a successful solve
    pub(crate) last_good_cmd: Option<ActuatorCmd>,

    num_ticks: u64,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    pub(crate) output: Option<OutputData>,
}

/// Output command from MpcCtrl, to be sent to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputData {
    pub cmd: ActuatorCmd,

    /// Where the command came from
    pub source: CmdSource,
}

/// Status report for MpcCtrl processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusReport {
    /// Index of the tick this report covers
    pub tick: u64,

    /// Cross track error at the start of the horizon
    pub cte_m: f64,

    /// Heading error at the start of the horizon
    pub epsi_rad: f64,

    pub speed: f64,

    /// Steering angle chosen by the solver, before normalisation
    pub steer_rad: f64,

    /// Normalised steering command sent
    pub steering_angle: f64,

    /// Throttle command sent
    pub throttle: f64,

    pub sqp_iterations: u32,
    pub solve_time_s: f64,
    pub cost: f64,

    pub fit_failed: bool,
    pub solve_failed: bool,
    pub fallback_used: bool,

    /// True if the command had to be clamped into its valid range
    pub output_limited: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    /// Waiting for telemetry
    Idle,

    /// A tick is being processed
    Solving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmdSource {
    /// The command is the first actuation of an optimised trajectory
    Solver,

    /// The command was set by the fallback policy
    Fallback(FallbackCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FallbackCause {
    FitFailed,
    SolveFailed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcCtrl {
    /// Create a new controller from the given parameters, without any archiving.
    pub fn new(params: Params) -> Result<Self, MpcCtrlError> {
        let mut ctrl = Self::default();
        ctrl.configure(params)?;
        Ok(ctrl)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn configure(&mut self, params: Params) -> Result<(), MpcCtrlError> {
        params.validate().map_err(MpcCtrlError::InvalidParams)?;

        self.traj_opt = TrajOpt::new(params.traj_opt.clone())
            .map_err(MpcCtrlError::InvalidParams)?;
        self.params = params;

        Ok(())
    }

    /// Fit the reference and solve for the command. Never fails, any failure is handled by the
    /// fallback policy.
    fn solve_tick(&mut self, pose: &Pose, points_m_v: &[Vector2<f64>]) -> OutputData {
        let xs: Vec<f64> = points_m_v.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points_m_v.iter().map(|p| p.y).collect();

        let reference = match poly_fit::fit(&xs, &ys, self.params.poly_degree) {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not fit the reference path, skipping the solve: {}", e);
                self.report.fit_failed = true;
                return self.fallback(FallbackCause::FitFailed, None);
            }
        };
        debug!("Reference coefficients: {:?}", reference.coeffs());

        let init = ModelState::at_origin(pose.speed, &reference);
        self.report.cte_m = init.cte_m;
        self.report.epsi_rad = init.epsi_rad;
        debug!("cte = {:.4} m, epsi = {:.4} rad", init.cte_m, init.epsi_rad);

        let display_ref = self.sample_reference(&reference);

        let sol = match self.traj_opt.solve(&init, &reference) {
            Ok(s) => s,
            Err(e) => {
                warn!("Trajectory optimisation failed: {}", e);
                self.report.solve_failed = true;
                return self.fallback(FallbackCause::SolveFailed, Some(display_ref));
            }
        };

        self.report.sqp_iterations = sol.iterations;
        self.report.solve_time_s = sol.solve_time_s;
        self.report.cost = sol.cost;
        self.report.steer_rad = sol.actuation.delta_rad;

        match self.cmd_from_solution(&sol, display_ref.clone()) {
            Some(cmd) => {
                self.last_good_cmd = Some(cmd.clone());
                OutputData {
                    cmd,
                    source: CmdSource::Solver,
                }
            }
            None => {
                warn!("Trajectory optimisation produced a non-finite command");
                self.report.solve_failed = true;
                self.fallback(FallbackCause::SolveFailed, Some(display_ref))
            }
        }
    }

    /// Build the command to send from a solution, or `None` if it is not finite.
    fn cmd_from_solution(
        &mut self,
        sol: &TrajOptSolution,
        display_ref: (Vec<f64>, Vec<f64>),
    ) -> Option<ActuatorCmd> {
        let p = &self.params.traj_opt;
        let delta = sol.actuation.delta_rad;
        let accel = sol.actuation.accel;

        if !delta.is_finite()
            || !accel.is_finite()
            || !sol.predicted_m.iter().all(|v| v.x.is_finite() && v.y.is_finite())
        {
            return None;
        }

        let steering_norm = lin_map((-p.max_steer_rad, p.max_steer_rad), (-1.0, 1.0), delta);
        let mut steering_angle = clamp(steering_norm, -1.0, 1.0);
        let throttle = clamp(accel, p.min_accel, p.max_accel);

        self.report.output_limited = steering_angle != steering_norm || throttle != accel;

        if self.params.invert_steering {
            steering_angle = -steering_angle;
        }

        let (next_x, next_y) = display_ref;

        Some(ActuatorCmd {
            steering_angle,
            throttle,
            mpc_x: sol.predicted_m.iter().map(|v| v.x).collect(),
            mpc_y: sol.predicted_m.iter().map(|v| v.y).collect(),
            next_x,
            next_y,
        })
    }

    /// The command given by the fallback policy.
    fn fallback(
        &self,
        cause: FallbackCause,
        display_ref: Option<(Vec<f64>, Vec<f64>)>,
    ) -> OutputData {
        let (steering_angle, throttle) = match self.params.fallback_policy {
            FallbackPolicy::HoldLast => self.last_good_cmd
                .as_ref()
                .map(|c| (c.steering_angle, c.throttle))
                .unwrap_or((0.0, 0.0)),
            FallbackPolicy::SafeStop => (0.0, self.params.traj_opt.min_accel),
        };

        let (next_x, next_y) = display_ref.unwrap_or_default();

        OutputData {
            cmd: ActuatorCmd {
                steering_angle,
                throttle,
                mpc_x: Vec::new(),
                mpc_y: Vec::new(),
                next_x,
                next_y,
            },
            source: CmdSource::Fallback(cause),
        }
    }

    /// Sample the reference polynomial ahead of the vehicle for display.
    fn sample_reference(&self, reference: &Polynomial) -> (Vec<f64>, Vec<f64>) {
        (1..=self.params.ref_display_num_points)
            .map(|i| {
                let x = i as f64 * self.params.ref_display_spacing_m;
                (x, reference.eval(x))
            })
            .unzip()
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle
    }
}

impl State for MpcCtrl {
    type InitData = &'static str;
    type InitError = MpcCtrlError;

    type InputData = Telemetry;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: Option<&Session>)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data)
            .map_err(MpcCtrlError::ParamLoadError)?;

        self.configure(params)?;

        if let Some(session) = session {
            self.arch_report = Archiver::from_path(session, "mpc_ctrl/status_report.csv")
                .map_err(MpcCtrlError::ArchiveError)?;
        }

        Ok(())
    }

    /// Perform cyclic processing of MPC control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        if self.mode == Mode::Solving {
            return Err(MpcCtrlError::Busy);
        }

        // Clear the status report
        self.report = StatusReport {
            tick: self.num_ticks,
            ..Default::default()
        };
        self.num_ticks += 1;

        let pose = Pose::from_telemetry(input_data)
            .map_err(MpcCtrlError::InvalidInput)?;
        let points_m_w = frame::points_from_parallel(&input_data.ptsx, &input_data.ptsy)
            .map_err(MpcCtrlError::InvalidInput)?;
        let points_m_v = frame::world_to_local(&pose, &points_m_w)
            .map_err(MpcCtrlError::InvalidInput)?;

        self.report.speed = pose.speed;

        self.mode = Mode::Solving;

        let output = self.solve_tick(&pose, &points_m_v);

        self.report.steering_angle = output.cmd.steering_angle;
        self.report.throttle = output.cmd.throttle;
        self.report.fallback_used = output.source != CmdSource::Solver;

        // Hold the command back to model the actuation latency
        if self.params.actuation_delay_s > 0.0 {
            thread::sleep(Duration::from_secs_f64(self.params.actuation_delay_s));
        }

        self.mode = Mode::Idle;

        trace!(
            "MpcCtrl output ({:?}): steering = {:.4}, throttle = {:.4}",
            output.source, output.cmd.steering_angle, output.cmd.throttle
        );

        self.output = Some(output.clone());

        Ok((output, self.report))
    }
}

impl Archived for MpcCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the frame answering a telemetry tick from the result of [`MpcCtrl::proc`].
///
/// Rejected ticks, and commands which cannot be encoded, are answered with the manual
/// acknowledgment.
pub fn reply_frame(result: &Result<(OutputData, StatusReport), MpcCtrlError>) -> String {
    let output = match result {
        Ok((output, _)) => output,
        Err(_) => return String::from(manual_frame()),
    };

    match output.cmd.to_frame() {
        Ok(f) => f,
        Err(e) => {
            warn!("Could not encode the steer event: {}", e);
            String::from(manual_frame())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    fn test_params() -> Params {
        let mut params = Params::default();
        params.actuation_delay_s = 0.0;
        params.traj_opt.solver.max_time_s = 10.0;
        params
    }

    fn straight_telem() -> Telemetry {
        Telemetry {
            ptsx: vec![0.0, 25.0, 50.0, 75.0, 100.0],
            ptsy: vec![0.0; 5],
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            speed: 10.0,
        }
    }

    #[test]
    fn test_straight_path() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();

        let (out, report) = ctrl.proc(&straight_telem()).unwrap();

        assert_eq!(out.source, CmdSource::Solver);
        assert!(report.cte_m.abs() < 1e-9);
        assert!(report.epsi_rad.abs() < 1e-9);
        assert!(out.cmd.steering_angle.abs() < 1e-2, "{:?}", out.cmd);
        assert!(out.cmd.throttle > 0.0, "{:?}", out.cmd);
        assert_eq!(out.cmd.mpc_x.len(), 9);
        assert_eq!(out.cmd.next_x.len(), 25);
        assert!(out.cmd.next_y.iter().all(|y| y.abs() < 1e-6));
        assert_eq!(ctrl.mode(), Mode::Idle);
        assert!(ctrl.last_good_cmd.is_some());
    }

    #[test]
    fn test_steering_sign() {
        // Vehicle 2 m left of a path along the world X axis
        let mut telem = straight_telem();
        telem.y = 2.0;

        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let (out, report) = ctrl.proc(&telem).unwrap();

        assert!((report.cte_m + 2.0).abs() < 1e-6);
        assert!(out.cmd.steering_angle > 0.0, "{:?}", out.cmd);
        assert!(out.cmd.steering_angle <= 1.0);

        let mut params = test_params();
        params.invert_steering = true;
        let mut ctrl = MpcCtrl::new(params).unwrap();
        let (out, _) = ctrl.proc(&telem).unwrap();

        assert!(out.cmd.steering_angle < 0.0, "{:?}", out.cmd);
    }

    #[test]
    fn test_fit_failure_holds_last() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let (good, _) = ctrl.proc(&straight_telem()).unwrap();

        // Three distinct waypoints can't define a cubic
        let mut telem = straight_telem();
        telem.ptsx = vec![0.0, 25.0, 50.0];
        telem.ptsy = vec![0.0; 3];

        let (out, report) = ctrl.proc(&telem).unwrap();

        assert_eq!(out.source, CmdSource::Fallback(FallbackCause::FitFailed));
        assert!(report.fit_failed);
        assert!(report.fallback_used);
        assert_eq!(report.sqp_iterations, 0);
        assert_eq!(out.cmd.steering_angle, good.cmd.steering_angle);
        assert_eq!(out.cmd.throttle, good.cmd.throttle);
        assert!(out.cmd.mpc_x.is_empty());
    }

    #[test]
    fn test_hold_last_without_history_is_neutral() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();

        let mut telem = straight_telem();
        telem.ptsx = vec![0.0, 10.0, 10.0, 20.0];
        telem.ptsy = vec![0.0, 1.0, 2.0, 3.0];

        let (out, _) = ctrl.proc(&telem).unwrap();

        assert_eq!(out.source, CmdSource::Fallback(FallbackCause::FitFailed));
        assert_eq!(out.cmd.steering_angle, 0.0);
        assert_eq!(out.cmd.throttle, 0.0);
    }

    #[test]
    fn test_solve_failure_safe_stop() {
        let mut params = test_params();
        params.fallback_policy = FallbackPolicy::SafeStop;
        params.traj_opt.solver.max_iters = 1;
        let mut ctrl = MpcCtrl::new(params).unwrap();

        let mut telem = straight_telem();
        telem.y = 2.0;

        let (out, report) = ctrl.proc(&telem).unwrap();

        assert_eq!(out.source, CmdSource::Fallback(FallbackCause::SolveFailed));
        assert!(report.solve_failed);
        assert_eq!(out.cmd.steering_angle, 0.0);
        assert_eq!(out.cmd.throttle, -1.0);
        assert_eq!(out.cmd.next_x.len(), 25);
        assert!(ctrl.last_good_cmd.is_none());
    }

    #[test]
    fn test_invalid_input() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();

        let mut telem = straight_telem();
        telem.psi = std::f64::NAN;
        assert!(matches!(ctrl.proc(&telem), Err(MpcCtrlError::InvalidInput(_))));

        let mut telem = straight_telem();
        telem.ptsy.pop();
        assert!(matches!(ctrl.proc(&telem), Err(MpcCtrlError::InvalidInput(_))));

        let mut telem = straight_telem();
        telem.ptsx.clear();
        telem.ptsy.clear();
        assert!(matches!(ctrl.proc(&telem), Err(MpcCtrlError::InvalidInput(_))));

        assert_eq!(ctrl.mode(), Mode::Idle);
        assert!(ctrl.output.is_none());
    }

    #[test]
    fn test_reply_frames() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();

        let result = ctrl.proc(&straight_telem());
        let frame = reply_frame(&result);
        assert!(frame.starts_with("42[\"steer\",{"), "{}", frame);
        assert!(frame.contains("\"steering_angle\""));

        let mut telem = straight_telem();
        telem.speed = std::f64::INFINITY;
        let result = ctrl.proc(&telem);
        assert!(matches!(result, Err(MpcCtrlError::InvalidInput(_))));
        assert_eq!(reply_frame(&result), manual_frame());

        ctrl.mode = Mode::Solving;
        assert_eq!(reply_frame(&ctrl.proc(&straight_telem())), manual_frame());
    }

    #[test]
    fn test_busy_rejected() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        ctrl.mode = Mode::Solving;

        assert!(matches!(ctrl.proc(&straight_telem()), Err(MpcCtrlError::Busy)));
    }

    #[test]
    fn test_actuation_delay() {
        let mut params = test_params();
        params.actuation_delay_s = 0.05;
        let mut ctrl = MpcCtrl::new(params).unwrap();

        let start = Instant::now();
        ctrl.proc(&straight_telem()).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_params() {
        let mut params = test_params();
        params.traj_opt.max_accel = -2.0;

        assert!(matches!(MpcCtrl::new(params), Err(MpcCtrlError::InvalidParams(_))));
    }
}
