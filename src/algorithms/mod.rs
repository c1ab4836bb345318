//! Core positioning algorithms

pub mod distance;
pub mod trilateration;

pub use distance::DistanceEstimator;
pub use trilateration::{RangeCircle, Trilaterator};
