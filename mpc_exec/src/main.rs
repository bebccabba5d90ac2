//! # MPC Control Executable
//!
//! This executable drives a vehicle along a reference path using receding horizon model
//! predictive control. The simulator bridge connects to the telemetry server and sends every
//! simulator frame it receives, the executable answers each one with a single reply frame:
//!
//!     - Telemetry events are processed by MpcCtrl, the reply is the resulting steer event
//!     - Telemetry events without data (manual driving) and unusable frames are answered with the
//!       manual event
//!     - Anything else is answered with an empty frame, which the bridge does not forward
//!
//! # Modules
//!
//! All cyclic modules (e.g. `mpc_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{debug, info, trace, warn};

// Internal
use comms_if::{
    net::{zmq, NetParams},
    sim::{manual_frame, SimEvent, Telemetry},
};
use mpc_lib::{
    mpc_ctrl::{reply_frame, MpcCtrl},
    telem_server::{TelemServer, TelemServerError},
};
use util::{
    archive::Archived,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "mpc_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load("net.toml")
        .wrap_err("Could not load the network parameters")?;

    info!("Parameters loaded");

    // ---- MODULE INITIALISATION ----

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl.init("mpc_ctrl.toml", Some(&session))
        .wrap_err("Failed to initialise MpcCtrl")?;

    session.save("mpc_ctrl_params.json", mpc_ctrl.params().clone());

    info!("MpcCtrl initialised");

    // ---- SERVER INITIALISATION ----

    let ctx = zmq::Context::new();

    let mut server = TelemServer::new(&ctx, &net_params)
        .wrap_err("Failed to initialise the telemetry server")?;

    info!("Telemetry server listening on {}", net_params.telemetry_endpoint);

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    let mut was_connected = false;

    loop {
        let connected = server.connected();
        if connected != was_connected {
            match connected {
                true => info!("Simulator bridge connected"),
                false => warn!("Simulator bridge disconnected"),
            }
            was_connected = connected;
        }

        let frame = match server.recv_frame() {
            Ok(Some(f)) => f,
            Ok(None) => continue,
            Err(TelemServerError::RecvError(zmq::Error::ETERM)) => break,
            Err(e) => {
                warn!("{}", e);
                continue
            }
        };

        let reply = match SimEvent::parse(&frame) {
            Ok(SimEvent::Telemetry(telem)) => process_telemetry(&mut mpc_ctrl, &telem),
            Ok(SimEvent::Manual) => String::from(manual_frame()),
            Ok(SimEvent::Other(name)) => {
                debug!("Ignoring \"{}\" event", name);
                String::new()
            },
            Ok(SimEvent::Ignored) => String::new(),
            Err(e) => {
                warn!("Could not parse frame from the simulator: {}", e);
                String::from(manual_frame())
            }
        };

        if let Err(e) = server.send_frame(&reply) {
            warn!("{}", e);
        }
    }

    info!("Telemetry context terminated, exiting");

    session.exit();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run MpcCtrl on a telemetry record and build the reply frame.
fn process_telemetry(mpc_ctrl: &mut MpcCtrl, telem: &Telemetry) -> String {
    let result = mpc_ctrl.proc(telem);

    match &result {
        Ok((_, report)) => {
            trace!("MpcCtrl status: {:?}", report);

            if let Err(e) = mpc_ctrl.write() {
                warn!("Could not archive MpcCtrl data: {}", e);
            }
        },
        Err(e) => warn!("MpcCtrl rejected the tick: {}", e),
    }

    reply_frame(&result)
}
