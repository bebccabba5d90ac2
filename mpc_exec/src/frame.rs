//! # Frame transformation
//!
//! Converts reference path points between the World frame (the simulator's map) and the Vehicle
//! frame. The Vehicle frame has its origin at the vehicle, with +X pointing along the vehicle's
//! heading and +Y to its left.
//!
//! The transform is a translation by the vehicle position followed by a rotation by the negative
//! heading. It is computed exactly, the optimizer's error terms are evaluated at the Vehicle frame
//! origin and rely on it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::sim::Telemetry;
use nalgebra::Vector2;
use serde::Serialize;
use util::maths::all_finite;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose of the vehicle in the World frame, along with its speed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct Pose {
    /// Position of the vehicle in the World frame
    pub position_m: Vector2<f64>,

    /// Heading of the vehicle, anticlockwise from the World +X axis.
    ///
    /// Units: radians
    pub heading_rad: f64,

    /// Forward speed of the vehicle in the simulator's native units.
    pub speed: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameError {
    #[error("No points were provided to transform")]
    Empty,

    #[error("Expected equal numbers of X and Y coordinates, found {0} X and {1} Y")]
    LengthMismatch(usize, usize),

    #[error("The pose or one of the points is not finite")]
    NonFinite,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Build the pose from a telemetry record, rejecting non-finite values.
    pub fn from_telemetry(telem: &Telemetry) -> Result<Self, FrameError> {
        if !all_finite(&[telem.x, telem.y, telem.psi, telem.speed]) {
            return Err(FrameError::NonFinite);
        }

        Ok(Self {
            position_m: Vector2::new(telem.x, telem.y),
            heading_rad: telem.psi,
            speed: telem.speed,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Zip parallel X and Y sequences into points.
pub fn points_from_parallel(xs: &[f64], ys: &[f64]) -> Result<Vec<Vector2<f64>>, FrameError> {
    if xs.len() != ys.len() {
        return Err(FrameError::LengthMismatch(xs.len(), ys.len()));
    }

    Ok(xs.iter().zip(ys).map(|(&x, &y)| Vector2::new(x, y)).collect())
}

/// Transform World frame points into the Vehicle frame of the given pose.
pub fn world_to_local(
    pose: &Pose,
    points_m_w: &[Vector2<f64>],
) -> Result<Vec<Vector2<f64>>, FrameError> {
    if points_m_w.is_empty() {
        return Err(FrameError::Empty);
    }

    if !pose.position_m.iter().all(|v| v.is_finite())
        || !pose.heading_rad.is_finite()
        || !points_m_w.iter().all(|p| p.iter().all(|v| v.is_finite()))
    {
        return Err(FrameError::NonFinite);
    }

    let (sin_psi, cos_psi) = pose.heading_rad.sin_cos();

    Ok(points_m_w
        .iter()
        .map(|p| {
            let d = p - pose.position_m;
            Vector2::new(
                d.x * cos_psi + d.y * sin_psi,
                -d.x * sin_psi + d.y * cos_psi,
            )
        })
        .collect())
}

/// Transform Vehicle frame points back into the World frame.
pub fn local_to_world(pose: &Pose, points_m_v: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
    let (sin_psi, cos_psi) = pose.heading_rad.sin_cos();

    points_m_v
        .iter()
        .map(|p| {
            Vector2::new(
                p.x * cos_psi - p.y * sin_psi,
                p.x * sin_psi + p.y * cos_psi,
            ) + pose.position_m
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn pose(x: f64, y: f64, psi: f64) -> Pose {
        Pose {
            position_m: Vector2::new(x, y),
            heading_rad: psi,
            speed: 0.0,
        }
    }

    #[test]
    fn test_identity_pose() {
        let pts = points_from_parallel(
            &[0.0, 25.0, 50.0, 75.0, 100.0],
            &[0.0, 0.0, 0.0, 0.0, 0.0],
        ).unwrap();

        let local = world_to_local(&pose(0.0, 0.0, 0.0), &pts).unwrap();
        assert_eq!(local, pts);
    }

    #[test]
    fn test_point_ahead_and_left() {
        // Vehicle at (1, 1) facing +Y, so a world point at (1, 3) is 2 m ahead and one at (0, 1)
        // is 1 m to the left.
        let p = pose(1.0, 1.0, FRAC_PI_2);
        let local = world_to_local(
            &p,
            &[Vector2::new(1.0, 3.0), Vector2::new(0.0, 1.0)]
        ).unwrap();

        assert!((local[0] - Vector2::new(2.0, 0.0)).norm() < 1e-12);
        assert!((local[1] - Vector2::new(0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let pts: Vec<Vector2<f64>> = (0..20)
            .map(|i| {
                let i = i as f64;
                Vector2::new(-40.0 + 3.7 * i, 108.0 - 2.1 * i * i)
            })
            .collect();

        for &(x, y, psi) in &[
            (0.0, 0.0, 0.0),
            (-40.62, 108.73, 3.733651),
            (12.0, -7.5, -2.0 * PI / 3.0),
            (1e3, 1e3, 7.0),
        ] {
            let p = pose(x, y, psi);
            let local = world_to_local(&p, &pts).unwrap();
            let world = local_to_world(&p, &local);

            for (a, b) in world.iter().zip(&pts) {
                assert!((a - b).norm() < 1e-9, "{} != {}", a, b);
            }
        }
    }

    #[test]
    fn test_invalid_input() {
        let p = pose(0.0, 0.0, 0.0);

        assert_eq!(world_to_local(&p, &[]), Err(FrameError::Empty));
        assert_eq!(
            points_from_parallel(&[1.0, 2.0], &[1.0]),
            Err(FrameError::LengthMismatch(2, 1))
        );
        assert_eq!(
            world_to_local(&pose(0.0, std::f64::NAN, 0.0), &[Vector2::new(1.0, 1.0)]),
            Err(FrameError::NonFinite)
        );
        assert_eq!(
            world_to_local(&p, &[Vector2::new(std::f64::INFINITY, 1.0)]),
            Err(FrameError::NonFinite)
        );

        let telem = Telemetry {
            speed: std::f64::NAN,
            ..Default::default()
        };
        assert_eq!(Pose::from_telemetry(&telem), Err(FrameError::NonFinite));
    }
}
