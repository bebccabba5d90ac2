//! # Curve fitting
//!
//! Fits a polynomial `f(x) = c0 + c1 x + c2 x^2 + ...` to reference path points by linear least
//! squares. The fit is solved with a QR factorisation of the column-scaled Vandermonde matrix,
//! which stays well conditioned for the waypoint spreads seen in the Vehicle frame (tens of
//! metres).
//!
//! In the Vehicle frame the constant coefficient is the cross track error at the vehicle and
//! `atan(c1)` is the heading of the path there.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use util::maths::all_finite;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Threshold on the ratio of smallest to largest diagonal element of R below which the scaled
/// design matrix is considered rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A polynomial in one variable, coefficients stored in ascending order of power.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolyFitError {
    #[error("Cannot fit a degree {degree} polynomial to {points} points")]
    UnderDetermined { points: usize, degree: usize },

    #[error("Expected equal numbers of X and Y values, found {0} X and {1} Y")]
    LengthMismatch(usize, usize),

    #[error("The points do not contain enough distinct X values for the requested degree")]
    Singular,

    #[error("The points or the fitted coefficients are not finite")]
    NonFinite,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Polynomial {
    /// Create a polynomial from its coefficients, lowest power first.
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Evaluate the polynomial at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// Evaluate the first derivative at `x`.
    pub fn deriv(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + (i as f64) * c)
    }

    /// Evaluate the second derivative at `x`.
    pub fn second_deriv(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + ((i * (i - 1)) as f64) * c)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Fit a polynomial of the given degree to the points `(xs[i], ys[i])` in the least squares sense.
///
/// At least `degree + 1` points with distinct X values are required.
pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Polynomial, PolyFitError> {
    if xs.len() != ys.len() {
        return Err(PolyFitError::LengthMismatch(xs.len(), ys.len()));
    }

    let num_coeffs = degree + 1;
    if xs.len() < num_coeffs {
        return Err(PolyFitError::UnderDetermined {
            points: xs.len(),
            degree,
        });
    }

    if !all_finite(xs) || !all_finite(ys) {
        return Err(PolyFitError::NonFinite);
    }

    // Vandermonde matrix, each column built from the previous one
    let mut a = DMatrix::<f64>::zeros(xs.len(), num_coeffs);
    for (i, x) in xs.iter().enumerate() {
        a[(i, 0)] = 1.0;
        for j in 1..num_coeffs {
            a[(i, j)] = a[(i, j - 1)] * x;
        }
    }

    // Scale columns to unit norm so the rank test is independent of the spread of X
    let mut scales = Vec::with_capacity(num_coeffs);
    for j in 0..num_coeffs {
        let norm = a.column(j).norm();
        if norm == 0.0 {
            return Err(PolyFitError::Singular);
        }
        a.column_mut(j).unscale_mut(norm);
        scales.push(norm);
    }

    let qr = a.qr();
    let r = qr.r();

    let r_diag_max = r.diagonal().amax();
    if r_diag_max == 0.0 || r.diagonal().iter().any(|d| d.abs() <= RANK_TOLERANCE * r_diag_max) {
        return Err(PolyFitError::Singular);
    }

    let qty = qr.q().transpose() * DVector::from_column_slice(ys);
    let scaled = r.solve_upper_triangular(&qty).ok_or(PolyFitError::Singular)?;

    let coeffs: Vec<f64> = scaled.iter().zip(scales.iter()).map(|(c, s)| c / s).collect();

    if !all_finite(&coeffs) {
        return Err(PolyFitError::NonFinite);
    }

    Ok(Polynomial::new(coeffs))
}
