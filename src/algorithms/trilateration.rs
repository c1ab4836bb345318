//! Closed-form 2D trilateration from three range circles
//!
//! Subtracting circle 1 from circle 2 and circle 2 from circle 3 removes the
//! quadratic terms and leaves a 2x2 linear system:
//!
//! ```text
//! | A  B | |x|   |C|      A = 2(x2 - x1)   B = 2(y2 - y1)
//! | D  E | |y| = |F|      D = 2(x3 - x2)   E = 2(y3 - y2)
//! ```
//!
//! The construction is asymmetric, so callers must always pass circles in the
//! same anchor order.

use crate::core::types::round2;
use crate::core::{Point2, COLLINEARITY_EPSILON};
use nalgebra::{Matrix2, Vector2};

/// A range circle: anchor position and estimated distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCircle {
    pub center: Point2,
    pub radius: f64,
}

impl RangeCircle {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self {
            center: Point2::new(x, y),
            radius,
        }
    }
}

/// Linearized three-circle intersection solver
#[derive(Debug, Clone, Copy)]
pub struct Trilaterator {
    /// Smallest accepted sine between the two baselines
    pub collinearity_epsilon: f64,
}

impl Default for Trilaterator {
    fn default() -> Self {
        Self {
            collinearity_epsilon: COLLINEARITY_EPSILON,
        }
    }
}

impl Trilaterator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve for the point best matching three range circles.
    ///
    /// Returns `None` when the anchors are collinear or coincident.
    pub fn solve(&self, circles: &[RangeCircle; 3]) -> Option<Point2> {
        let [c1, c2, c3] = circles;
        let (x1, y1, r1) = (c1.center.x, c1.center.y, c1.radius);
        let (x2, y2, r2) = (c2.center.x, c2.center.y, c2.radius);
        let (x3, y3, r3) = (c3.center.x, c3.center.y, c3.radius);

        let system = Matrix2::new(
            2.0 * (x2 - x1), 2.0 * (y2 - y1),
            2.0 * (x3 - x2), 2.0 * (y3 - y2),
        );
        let rhs = Vector2::new(
            r1 * r1 - r2 * r2 - x1 * x1 + x2 * x2 - y1 * y1 + y2 * y2,
            r2 * r2 - r3 * r3 - x2 * x2 + x3 * x3 - y2 * y2 + y3 * y3,
        );

        if !self.is_well_conditioned(&system) {
            return None;
        }

        let inverse = system.try_inverse()?;
        let solution = inverse * rhs;
        if !solution.x.is_finite() || !solution.y.is_finite() {
            return None;
        }

        Some(Point2::new(round2(solution.x), round2(solution.y)))
    }

    /// Whether three anchor positions are usable for trilateration
    pub fn is_solvable_geometry(&self, anchors: &[Point2; 3]) -> bool {
        let circles = anchors.map(|p| RangeCircle {
            center: p,
            radius: 0.0,
        });
        let [c1, c2, c3] = circles;
        let system = Matrix2::new(
            2.0 * (c2.center.x - c1.center.x), 2.0 * (c2.center.y - c1.center.y),
            2.0 * (c3.center.x - c2.center.x), 2.0 * (c3.center.y - c2.center.y),
        );
        self.is_well_conditioned(&system)
    }

    // |det| = |row1| |row2| sin(theta); compare sin(theta) against epsilon so
    // the check does not depend on the coordinate unit scale.
    fn is_well_conditioned(&self, system: &Matrix2<f64>) -> bool {
        let det = system.determinant();
        let scale = system.row(0).norm() * system.row(1).norm();

        det.is_finite() && scale.is_finite() && det.abs() > self.collinearity_epsilon * scale
    }
}
