//! # Trajectory Optimisation Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use comms_if::sim::Telemetry;
use mpc_lib::{
    mpc_ctrl::{self, MpcCtrl},
    poly_fit,
    traj_opt::{Params, TrajOpt},
    vehicle_model::ModelState,
};
use util::module::State;

fn traj_opt_benchmark(c: &mut Criterion) {
    // ---- Build a curved reference ----

    let xs: Vec<f64> = (0..6).map(|i| i as f64 * 12.0).collect();
    let ys: Vec<f64> = xs.iter().map(|x| -1.5 + 0.04 * x + 0.002 * x * x).collect();
    let reference = poly_fit::fit(&xs, &ys, 3).unwrap();
    let init = ModelState::at_origin(25.0, &reference);

    let traj_opt = TrajOpt::new(Params::default()).unwrap();

    c.bench_function("poly_fit::fit", |b| {
        b.iter(|| poly_fit::fit(&xs, &ys, 3).unwrap())
    });

    c.bench_function("TrajOpt::solve", |b| {
        b.iter(|| traj_opt.solve(&init, &reference).unwrap())
    });

    // ---- Full tick, without the actuation delay ----

    let mut params = mpc_ctrl::Params::default();
    params.actuation_delay_s = 0.0;
    let mut ctrl = MpcCtrl::new(params).unwrap();

    let telem = Telemetry {
        ptsx: vec![-32.16173, -43.49173, -61.09, -78.29172, -93.05002, -107.7717],
        ptsy: vec![113.361, 105.941, 92.88499, 78.73102, 65.34102, 50.57938],
        x: -40.62,
        y: 108.73,
        psi: 3.733651,
        speed: 10.0,
    };

    c.bench_function("MpcCtrl::proc", |b| {
        b.iter(|| ctrl.proc(&telem).unwrap())
    });
}

criterion_group!(benches, traj_opt_benchmark);
criterion_main!(benches);
